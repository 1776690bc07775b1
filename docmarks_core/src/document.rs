//! Lock-owning document handle.
//!
//! A [`Document`] wraps one [`DocumentOps`] behind a re-entrant lock. Any
//! thread may hold a `&Document`; the lock serialises them. The owning thread
//! may re-enter for reads, e.g. from a render callback, but a mutation while
//! the same thread still borrows the document is refused with
//! [`Error::Reentrant`].

use crate::buffer::{CharStore, TextBuffer};
use crate::config::DocumentConfig;
use crate::edit::DocumentEdit;
use crate::error::{Error, Result};
use crate::mark::{MarkId, MarkInfo, MarkKind};
use crate::ops::DocumentOps;
use crate::syntax::{Language, Lexer, StandardLexer};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;

/// Thread-safe handle to a document and its marks.
pub struct Document<S = TextBuffer, L = StandardLexer> {
    inner: ReentrantMutex<RefCell<DocumentOps<S, L>>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty plain-text document.
    pub fn new() -> Self {
        Self::from_ops(DocumentOps::new())
    }

    /// Creates a document holding `text`.
    pub fn from_text(text: &str, language: Language) -> Self {
        Self::from_ops(DocumentOps::from_text(text, language))
    }
}

impl<S: CharStore, L: Lexer> Document<S, L> {
    /// Builds a document over an existing store.
    pub fn with_parts(store: S, lexer: L, config: DocumentConfig) -> Result<Self> {
        Ok(Self::from_ops(DocumentOps::with_parts(store, lexer, config)?))
    }

    pub fn from_ops(ops: DocumentOps<S, L>) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(ops)),
        }
    }

    pub fn into_inner(self) -> DocumentOps<S, L> {
        self.inner.into_inner().into_inner()
    }

    /// Runs `f` with shared access. Nested reads on the same thread are fine.
    pub fn read<R>(&self, f: impl FnOnce(&DocumentOps<S, L>) -> R) -> Result<R> {
        let guard = self.inner.lock();
        let ops = guard.try_borrow().map_err(|_| Error::Reentrant)?;
        Ok(f(&ops))
    }

    /// Runs `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut DocumentOps<S, L>) -> R) -> Result<R> {
        let guard = self.inner.lock();
        let mut ops = guard.try_borrow_mut().map_err(|_| Error::Reentrant)?;
        Ok(f(&mut ops))
    }

    pub fn len(&self) -> Result<usize> {
        self.read(|ops| ops.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(|ops| ops.is_empty())
    }

    pub fn line_count(&self) -> Result<usize> {
        self.read(|ops| ops.line_count())
    }

    pub fn text(&self) -> Result<String> {
        self.read(|ops| ops.text())?
    }

    pub fn insert_text(&self, offset: usize, text: &str) -> Result<DocumentEdit> {
        self.write(|ops| ops.insert_text(offset, text))?
    }

    pub fn remove_text(&self, offset: usize, length: usize) -> Result<DocumentEdit> {
        self.write(|ops| ops.remove_text(offset, length))?
    }

    /// Starts tracking `offset` with a plain mark.
    pub fn create_mark(&self, offset: usize, insert_after: bool) -> Result<MarkId> {
        self.create_mark_with(offset, insert_after, MarkKind::Plain)
    }

    pub fn create_mark_with(&self, offset: usize, insert_after: bool, kind: MarkKind) -> Result<MarkId> {
        self.write(|ops| ops.create_mark(offset, insert_after, kind))?
    }

    pub fn remove_mark(&self, id: MarkId) -> Result<()> {
        self.write(|ops| ops.remove_mark(id))?
    }

    pub fn offset_of(&self, id: MarkId) -> Result<usize> {
        self.read(|ops| ops.offset_of(id))?
    }

    pub fn line_of(&self, id: MarkId) -> Result<usize> {
        self.read(|ops| ops.line_of(id))?
    }

    /// Calls `visit` for every mark with `start <= offset < end` while the
    /// document is locked.
    pub fn render_marks_in_range(
        &self,
        start: usize,
        end: usize,
        visit: impl FnMut(&MarkInfo, &MarkKind),
    ) -> Result<()> {
        self.read(|ops| ops.marks_in_range(start, end, visit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let doc = Document::from_text("hello\nworld", Language::PlainText);
        let mark = doc.create_mark(6, false).unwrap();
        doc.insert_text(0, ">> ").unwrap();
        assert_eq!(doc.offset_of(mark).unwrap(), 9);
        assert_eq!(doc.line_of(mark).unwrap(), 1);
        doc.remove_text(0, 3).unwrap();
        assert_eq!(doc.text().unwrap(), "hello\nworld");
        assert_eq!(doc.line_count().unwrap(), 2);
        doc.remove_mark(mark).unwrap();
        assert_eq!(doc.offset_of(mark), Err(Error::InvalidMark(mark)));
    }

    #[test]
    fn test_nested_read_inside_render() {
        let doc = Document::from_text("abcdef", Language::PlainText);
        doc.create_mark(2, false).unwrap();
        doc.create_mark(4, false).unwrap();
        let mut lines = Vec::new();
        doc.render_marks_in_range(0, 6, |info, kind| {
            if !kind.is_syntax() {
                lines.push(doc.line_of(info.id).unwrap());
            }
        })
        .unwrap();
        assert_eq!(lines, vec![0, 0]);
    }

    #[test]
    fn test_mutation_while_borrowed_is_refused() {
        let doc = Document::from_text("abc", Language::PlainText);
        let nested = doc.read(|_| doc.insert_text(0, "x")).unwrap();
        assert_eq!(nested, Err(Error::Reentrant));

        let nested = doc.write(|_| doc.len()).unwrap();
        assert_eq!(nested, Err(Error::Reentrant));
        assert_eq!(doc.text().unwrap(), "abc");
    }

    #[test]
    fn test_concurrent_writers() {
        let doc = Arc::new(Document::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let doc = Arc::clone(&doc);
                thread::spawn(move || {
                    for _ in 0..100 {
                        doc.insert_text(0, "ab\n").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(doc.len().unwrap(), 1_200);
        assert_eq!(doc.line_count().unwrap(), 401);
        doc.read(|ops| ops.marks().check_invariants()).unwrap().unwrap();
    }
}
