//! Mark handles and the values the tree hands back for them.

use crate::syntax::LexState;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of one mark tree, carried by every handle it issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u32);

impl TreeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a tracked position.
///
/// Handles are cheap to copy. A handle stays valid from insertion until the
/// mark is removed; afterwards every operation on it reports
/// [`Error::InvalidMark`](crate::Error::InvalidMark), even if its slot has
/// been recycled for a newer mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkId {
    pub(crate) tree: TreeId,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// What a mark is used for. The tree stores it but never looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MarkKind {
    /// Caret, selection bound or any other bare position.
    #[default]
    Plain,
    /// User bookmark.
    Bookmark,
    /// Lexer checkpoint. `None` until the rescanner has computed its state.
    Syntax(Option<LexState>),
    /// Anchor used by line-oriented views.
    LineAnchor,
}

impl MarkKind {
    /// Returns true for lexer checkpoints.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_))
    }

    /// Returns the saved lexer state of a checkpoint.
    pub fn lex_state(&self) -> Option<&LexState> {
        match self {
            Self::Syntax(state) => state.as_ref(),
            _ => None,
        }
    }
}

/// Absolute position of a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkPosition {
    /// Character offset.
    pub offset: usize,
    /// Zero-based line number.
    pub line: usize,
}

impl MarkPosition {
    pub fn new(offset: usize, line: usize) -> Self {
        Self { offset, line }
    }
}

/// Result of a nearest-mark lookup.
///
/// `mark` is `None` when no mark precedes the requested location; the
/// position then describes the start of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestMark {
    pub mark: Option<MarkId>,
    pub offset: usize,
    pub line: usize,
}

impl NearestMark {
    /// The synthetic start-of-document sentinel.
    pub fn document_start() -> Self {
        Self {
            mark: None,
            offset: 0,
            line: 0,
        }
    }

    /// Returns true if this is the start-of-document sentinel.
    pub fn is_document_start(&self) -> bool {
        self.mark.is_none()
    }
}

/// One mark as seen while walking the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkInfo {
    pub id: MarkId,
    pub offset: usize,
    pub line: usize,
    /// True if text inserted exactly at `offset` leaves the mark in place.
    pub insert_after: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_ids_are_unique() {
        let a = TreeId::next();
        let b = TreeId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_kind_helpers() {
        assert!(!MarkKind::Plain.is_syntax());
        assert!(MarkKind::Syntax(None).is_syntax());
        assert_eq!(MarkKind::Syntax(None).lex_state(), None);

        let state = LexState::default();
        assert_eq!(MarkKind::Syntax(Some(state)).lex_state(), Some(&state));
        assert_eq!(MarkKind::Bookmark.lex_state(), None);
    }

    #[test]
    fn test_document_start() {
        let start = NearestMark::document_start();
        assert!(start.is_document_start());
        assert_eq!((start.offset, start.line), (0, 0));
    }
}
