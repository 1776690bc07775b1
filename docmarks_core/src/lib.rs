//! Docmarks Core - position tracking for text-buffer engines.
//!
//! This crate keeps marks (carets, bookmarks, syntax checkpoints) anchored
//! to their offsets and lines while a document is edited, and keeps lexer
//! checkpoints evenly spaced and up to date for incremental re-lexing. It has
//! no dependencies on windowing or rendering systems.

pub mod buffer;
pub mod config;
pub mod document;
pub mod edit;
pub mod error;
pub mod line_cache;
pub mod mark;
pub mod ops;
pub mod syntax;
pub mod tree;

pub use buffer::{CharStore, TextBuffer};
pub use config::DocumentConfig;
pub use document::Document;
pub use edit::{DocumentEdit, EditKind};
pub use error::{Error, Result};
pub use line_cache::{LineCache, LineSpan};
pub use mark::{MarkId, MarkInfo, MarkKind, MarkPosition, NearestMark, TreeId};
pub use ops::{Boundary, Checkpoint, DocumentOps, RescanStop};
pub use syntax::{Language, LexState, Lexer, StandardLexer};
pub use tree::MarkTree;
