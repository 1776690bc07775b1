//! Description of one applied text edit.
//!
//! Every insertion or removal performed by the document layer produces a
//! [`DocumentEdit`]. Undo machinery can store it and replay its
//! [`inverse`](DocumentEdit::inverse).

/// Direction of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Remove,
}

/// One insertion or removal, as applied to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEdit {
    /// Character offset of the edit.
    pub offset: usize,
    /// Inserted or removed text.
    pub text: String,
    pub kind: EditKind,
    /// Line containing `offset` before the edit.
    pub line: usize,
    /// Number of line feeds in `text`.
    pub lf_count: usize,
    /// Character index of the first line feed inside `text`.
    pub first_lf: Option<usize>,
    /// Offset at which the syntax rescan triggered by this edit stopped.
    pub syntax_update_offset: Option<usize>,
    char_len: usize,
}

impl DocumentEdit {
    /// Describes `text` inserted at `offset` on `line`.
    pub fn insertion(offset: usize, line: usize, text: impl Into<String>) -> Self {
        Self::new(EditKind::Insert, offset, line, text.into())
    }

    /// Describes `text` removed at `offset` on `line`.
    pub fn removal(offset: usize, line: usize, text: impl Into<String>) -> Self {
        Self::new(EditKind::Remove, offset, line, text.into())
    }

    fn new(kind: EditKind, offset: usize, line: usize, text: String) -> Self {
        let bytes = text.as_bytes();
        let lf_count = bytecount::count(bytes, b'\n');
        let first_lf = memchr::memchr(b'\n', bytes).map(|byte| text[..byte].chars().count());
        let char_len = text.chars().count();
        Self {
            offset,
            text,
            kind,
            line,
            lf_count,
            first_lf,
            syntax_update_offset: None,
            char_len,
        }
    }

    /// Number of characters inserted or removed.
    pub fn len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    pub fn is_insert(&self) -> bool {
        self.kind == EditKind::Insert
    }

    /// Offset just past the edited text, measured before a removal or after
    /// an insertion.
    pub fn end(&self) -> usize {
        self.offset + self.char_len
    }

    /// Returns the edit that undoes this one.
    pub fn inverse(&self) -> DocumentEdit {
        let kind = match self.kind {
            EditKind::Insert => EditKind::Remove,
            EditKind::Remove => EditKind::Insert,
        };
        DocumentEdit {
            kind,
            syntax_update_offset: None,
            ..self.clone()
        }
    }
}
