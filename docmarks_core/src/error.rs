//! Error types shared by the mark tree and the document layer.

use crate::mark::MarkId;

/// Errors reported to callers of the mark tree and document operations.
///
/// Broken tree invariants are not represented here: they indicate a bug in
/// the tree maintenance code and panic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An offset argument lies outside the valid range.
    #[error("bad location: offset {offset} is outside 0..={limit}")]
    BadLocation { offset: usize, limit: usize },
    /// A line argument lies outside the valid range.
    #[error("bad location: line {line} is outside 0..={limit}")]
    BadLine { line: usize, limit: usize },
    /// The mark handle is not tracked by this tree (removed, never inserted,
    /// already inserted, or created by another tree).
    #[error("invalid mark {0:?}")]
    InvalidMark(MarkId),
    /// Syntax checkpoints are created and removed by the document only.
    #[error("syntax checkpoints are managed by the document")]
    ReservedKind,
    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The document was asked to mutate while the calling thread still
    /// borrows it.
    #[error("document is already borrowed by this thread")]
    Reentrant,
}

impl Error {
    /// Returns true for the offset/line validation failures.
    pub fn is_bad_location(&self) -> bool {
        matches!(self, Self::BadLocation { .. } | Self::BadLine { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
