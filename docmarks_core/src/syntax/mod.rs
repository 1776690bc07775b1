//! Lexing support for syntax checkpoints.
//!
//! Provides the resumable [`Lexer`] interface the document drives after each
//! edit, and a standard hand-written lexer for the built-in languages.

mod language;
mod lexer;
mod scanner;

pub use language::{Language, LanguageRules};
pub use lexer::{LexInput, LexMode, LexState, Lexeme, Lexer, Token, TokenKind};
pub use scanner::StandardLexer;
