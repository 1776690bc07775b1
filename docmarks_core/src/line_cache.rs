//! Small most-recently-used cache of line extents.
//!
//! Line lookups cluster around the caret, so a handful of entries answer most
//! of them. Edits adjust the entries in place; an entry whose line may have
//! changed shape is dropped instead.

/// Extent of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    /// Offset of the first character.
    pub begin: usize,
    /// Offset of the terminating line feed, or the document length for the
    /// last line.
    pub end: usize,
    /// Zero-based line number.
    pub line: usize,
}

impl LineSpan {
    pub fn new(begin: usize, end: usize, line: usize) -> Self {
        Self { begin, end, line }
    }

    fn contains(&self, offset: usize) -> bool {
        self.begin <= offset && offset <= self.end
    }
}

/// Line extents, most recently used first.
#[derive(Debug, Clone, Default)]
pub struct LineCache {
    entries: Vec<LineSpan>,
}

impl LineCache {
    /// Maximum number of cached lines.
    pub const CAPACITY: usize = 5;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached line containing `offset`.
    pub fn by_offset(&mut self, offset: usize) -> Option<LineSpan> {
        let index = self.entries.iter().position(|span| span.contains(offset))?;
        Some(self.promote(index))
    }

    /// Cached extent of `line`.
    pub fn by_line(&mut self, line: usize) -> Option<LineSpan> {
        let index = self.entries.iter().position(|span| span.line == line)?;
        Some(self.promote(index))
    }

    /// Records a line, evicting the least recently used one if full.
    pub fn store(&mut self, span: LineSpan) {
        self.entries.retain(|s| s.line != span.line);
        self.entries.insert(0, span);
        self.entries.truncate(Self::CAPACITY);
    }

    /// Adjusts entries for `len` characters holding `lfs` line feeds
    /// inserted at `offset`.
    pub fn inserted(&mut self, offset: usize, len: usize, lfs: usize) {
        self.entries.retain_mut(|span| {
            if offset > span.end {
                true
            } else if offset < span.begin {
                span.begin += len;
                span.end += len;
                span.line += lfs;
                true
            } else if lfs == 0 {
                span.end += len;
                true
            } else {
                false
            }
        });
    }

    /// Adjusts entries for the `len` characters at `offset` holding `lfs`
    /// line feeds being removed.
    pub fn removed(&mut self, offset: usize, len: usize, lfs: usize) {
        let end = offset + len;
        self.entries.retain_mut(|span| {
            if offset > span.end {
                true
            } else if end < span.begin {
                span.begin -= len;
                span.end -= len;
                span.line -= lfs;
                true
            } else if lfs == 0 && span.begin <= offset && end <= span.end {
                span.end -= len;
                true
            } else {
                false
            }
        });
    }

    fn promote(&mut self, index: usize) -> LineSpan {
        let span = self.entries.remove(index);
        self.entries.insert(0, span);
        span
    }
}
