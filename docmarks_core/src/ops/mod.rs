//! Edit orchestration above the mark tree.
//!
//! [`DocumentOps`] owns the character store, the mark tree, the line cache and
//! the lexer. Every edit goes through it: the store is changed first, then the
//! marks, then the cache, and finally the syntax checkpoints are re-spaced and
//! re-lexed around the edit.

mod density;
mod rescan;

pub use rescan::RescanStop;

use crate::buffer::{CharStore, TextBuffer};
use crate::config::DocumentConfig;
use crate::edit::{DocumentEdit, EditKind};
use crate::error::{Error, Result};
use crate::line_cache::{LineCache, LineSpan};
use crate::mark::{MarkId, MarkInfo, MarkKind};
use crate::syntax::{Language, LexState, Lexeme, Lexer, StandardLexer, Token};
use crate::tree::MarkTree;
use rescan::TextFeed;
use std::cell::RefCell;

/// Which end of a line [`DocumentOps::boundary_of_line`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Offset of the first character of the line.
    Begin,
    /// Offset of the terminating line feed, or the document length.
    End,
}

/// A syntax checkpoint and its saved lexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: MarkId,
    pub offset: usize,
    pub line: usize,
    pub state: Option<LexState>,
}

/// Document text, marks and syntax checkpoints kept in step with each other.
#[derive(Debug)]
pub struct DocumentOps<S = TextBuffer, L = StandardLexer> {
    store: S,
    marks: MarkTree,
    line_cache: RefCell<LineCache>,
    config: DocumentConfig,
    lexer: L,
    /// Permanent checkpoint at offset 0; always the first mark.
    start_checkpoint: MarkId,
}

impl Default for DocumentOps {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentOps {
    /// Creates an empty plain-text document.
    pub fn new() -> Self {
        Self::from_text("", Language::PlainText)
    }

    /// Creates a document holding `text`, lexed as `language`.
    pub fn from_text(text: &str, language: Language) -> Self {
        Self::with_parts(
            TextBuffer::from_str(text),
            StandardLexer::new(language),
            DocumentConfig::default(),
        )
        .unwrap_or_else(|err| unreachable!("default document setup failed: {err}"))
    }
}

impl<S: CharStore, L: Lexer> DocumentOps<S, L> {
    /// Builds a document over an existing store.
    pub fn with_parts(store: S, lexer: L, config: DocumentConfig) -> Result<Self> {
        config.validate()?;
        let len = store.len();
        let lines = count_line_feeds(&store.read(0, len)?);
        let mut marks = MarkTree::new(len, lines);
        let start_checkpoint =
            marks.insert_new(0, 0, true, MarkKind::Syntax(Some(LexState::default())))?;
        let mut ops = Self {
            store,
            marks,
            line_cache: RefCell::new(LineCache::new()),
            config,
            lexer,
            start_checkpoint,
        };
        let dirty_until = ops.ensure_syntax_mark_density(0, len)?;
        ops.rescan_from(start_checkpoint, len, dirty_until)?;
        log::debug!(
            "document opened: {} chars, {} lines, {} checkpoints",
            len,
            lines + 1,
            ops.checkpoints().len()
        );
        Ok(ops)
    }

    // ==================== Accessors ====================

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn marks(&self) -> &MarkTree {
        &self.marks
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn lexer(&self) -> &L {
        &self.lexer
    }

    /// Number of characters in the document.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines; an empty document has one.
    pub fn line_count(&self) -> usize {
        self.marks.extent().line + 1
    }

    /// Whole document text.
    pub fn text(&self) -> Result<String> {
        self.store.read(0, self.len())
    }

    /// `len` characters starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<String> {
        self.store.read(offset, len)
    }

    pub fn find_forward(&self, pattern: char, start: usize, limit: usize) -> Option<usize> {
        self.store.find_forward(pattern, start, limit)
    }

    pub fn find_backward(&self, pattern: char, start: usize, limit: usize) -> Option<usize> {
        self.store.find_backward(pattern, start, limit)
    }

    // ==================== Edits ====================

    /// Inserts `text` at `offset`.
    pub fn insert_text(&mut self, offset: usize, text: &str) -> Result<DocumentEdit> {
        let len = self.len();
        if offset > len {
            return Err(Error::BadLocation { offset, limit: len });
        }
        let line = self.line_from_offset(offset)?;
        let mut edit = DocumentEdit::insertion(offset, line, text);
        if edit.is_empty() {
            return Ok(edit);
        }

        self.store.insert_chars(offset, text)?;
        self.marks.insert_update(offset, edit.len(), edit.lf_count)?;
        self.line_cache
            .get_mut()
            .inserted(offset, edit.len(), edit.lf_count);
        log::trace!(
            "insert {} chars ({} line feeds) at {}",
            edit.len(),
            edit.lf_count,
            offset
        );
        self.after_edit(&mut edit)?;
        Ok(edit)
    }

    /// Removes `length` characters at `offset`.
    ///
    /// A removal starting at the end of the document, or of zero length,
    /// changes nothing and returns an empty edit.
    pub fn remove_text(&mut self, offset: usize, length: usize) -> Result<DocumentEdit> {
        let len = self.len();
        if offset > len {
            return Err(Error::BadLocation { offset, limit: len });
        }
        let line = self.line_from_offset(offset)?;
        if offset == len || length == 0 {
            return Ok(DocumentEdit::removal(offset, line, String::new()));
        }
        let end = offset.saturating_add(length);
        if end > len {
            return Err(Error::BadLocation {
                offset: end,
                limit: len,
            });
        }

        let mut edit = DocumentEdit::removal(offset, line, self.store.read(offset, length)?);
        self.store.remove_chars(offset, length)?;
        let mut collapsed = 0usize;
        self.marks
            .remove_update(offset, line, length, edit.lf_count, |_| collapsed += 1)?;
        self.line_cache
            .get_mut()
            .removed(offset, length, edit.lf_count);
        log::trace!(
            "remove {} chars ({} line feeds) at {}, {} marks collapsed",
            length,
            edit.lf_count,
            offset,
            collapsed
        );
        self.after_edit(&mut edit)?;
        Ok(edit)
    }

    /// Replays a recorded edit, e.g. the inverse of one being undone.
    pub fn apply(&mut self, edit: &DocumentEdit) -> Result<DocumentEdit> {
        match edit.kind {
            EditKind::Insert => self.insert_text(edit.offset, &edit.text),
            EditKind::Remove => self.remove_text(edit.offset, edit.len()),
        }
    }

    fn after_edit(&mut self, edit: &mut DocumentEdit) -> Result<()> {
        let end = if edit.is_insert() { edit.end() } else { edit.offset };
        let mut dirty_until = self.ensure_syntax_mark_density(edit.offset, end)?;
        if !edit.is_insert() {
            // Checkpoints collapsed onto the removal point hold states of
            // removed text.
            dirty_until = dirty_until.max(edit.offset + 1);
        }
        let (left, _) = self.checkpoint_within(self.marks.count_before(edit.offset), true)?;
        self.rescan_syntax(left.id, edit, dirty_until)?;
        debug_assert_eq!(self.marks.check_invariants(), Ok(()));
        Ok(())
    }

    // ==================== Lines ====================

    /// Line containing `offset`.
    pub fn line_from_offset(&self, offset: usize) -> Result<usize> {
        Ok(self.span_at(offset)?.line)
    }

    /// Offset of the first character of `line`.
    pub fn offset_from_line(&self, line: usize) -> Result<usize> {
        Ok(self.span_of_line(line)?.begin)
    }

    /// Start or end of the line containing `offset`.
    pub fn boundary_of_line(&self, offset: usize, boundary: Boundary) -> Result<usize> {
        let span = self.span_at(offset)?;
        Ok(match boundary {
            Boundary::Begin => span.begin,
            Boundary::End => span.end,
        })
    }

    /// Extent of the line containing `offset`.
    pub fn line_span(&self, offset: usize) -> Result<LineSpan> {
        self.span_at(offset)
    }

    fn span_at(&self, offset: usize) -> Result<LineSpan> {
        let len = self.len();
        if offset > len {
            return Err(Error::BadLocation { offset, limit: len });
        }
        if let Some(span) = self.line_cache.borrow_mut().by_offset(offset) {
            return Ok(span);
        }
        // The nearest mark bounds how much text has to be counted.
        let near = self.marks.left_mark(offset);
        let line = near.line + count_line_feeds(&self.store.read(near.offset, offset - near.offset)?);
        let begin = self
            .store
            .find_backward('\n', offset, 0)
            .map_or(0, |lf| lf + 1);
        let end = self.store.find_forward('\n', offset, len).unwrap_or(len);
        let span = LineSpan::new(begin, end, line);
        self.line_cache.borrow_mut().store(span);
        Ok(span)
    }

    fn span_of_line(&self, line: usize) -> Result<LineSpan> {
        let last = self.marks.extent().line;
        if line > last {
            return Err(Error::BadLine { line, limit: last });
        }
        if let Some(span) = self.line_cache.borrow_mut().by_line(line) {
            return Ok(span);
        }
        let len = self.len();
        let near = self.marks.mark_from_line(line);
        let begin = if near.line == line {
            self.store
                .find_backward('\n', near.offset, 0)
                .map_or(0, |lf| lf + 1)
        } else {
            let mut pos = near.offset;
            for _ in near.line..line {
                let lf = self
                    .store
                    .find_forward('\n', pos, len)
                    .ok_or(Error::BadLine { line, limit: last })?;
                pos = lf + 1;
            }
            pos
        };
        let end = self.store.find_forward('\n', begin, len).unwrap_or(len);
        let span = LineSpan::new(begin, end, line);
        self.line_cache.borrow_mut().store(span);
        Ok(span)
    }

    // ==================== Marks ====================

    /// Starts tracking `offset`. Syntax checkpoints cannot be created here.
    pub fn create_mark(&mut self, offset: usize, insert_after: bool, kind: MarkKind) -> Result<MarkId> {
        if kind.is_syntax() {
            return Err(Error::ReservedKind);
        }
        let line = self.line_from_offset(offset)?;
        self.marks.insert_new(offset, line, insert_after, kind)
    }

    /// Stops tracking a mark created with [`create_mark`](Self::create_mark).
    pub fn remove_mark(&mut self, id: MarkId) -> Result<()> {
        if self.marks.kind(id)?.is_syntax() {
            return Err(Error::ReservedKind);
        }
        self.marks.remove(id)
    }

    pub fn offset_of(&self, id: MarkId) -> Result<usize> {
        self.marks.offset_of(id)
    }

    pub fn line_of(&self, id: MarkId) -> Result<usize> {
        self.marks.line_of(id)
    }

    pub fn mark_kind(&self, id: MarkId) -> Result<&MarkKind> {
        self.marks.kind(id)
    }

    /// Calls `visit` for every mark with `start <= offset < end`, in order.
    pub fn marks_in_range(&self, start: usize, end: usize, mut visit: impl FnMut(&MarkInfo, &MarkKind)) {
        self.marks.render(|tree| {
            for info in tree.range(start, end) {
                if let Ok(kind) = tree.kind(info.id) {
                    visit(&info, kind);
                }
            }
        });
    }

    /// All syntax checkpoints in document order.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.marks
            .iter()
            .filter_map(|info| match self.marks.kind(info.id) {
                Ok(MarkKind::Syntax(state)) => Some(Checkpoint {
                    id: info.id,
                    offset: info.offset,
                    line: info.line,
                    state: *state,
                }),
                _ => None,
            })
            .collect()
    }

    /// Last checkpoint among the first `count` marks, optionally skipping
    /// checkpoints whose state is not computed yet. Falls back to the start
    /// checkpoint.
    fn checkpoint_within(&self, count: usize, known: bool) -> Result<(MarkInfo, Option<LexState>)> {
        for index in (0..count).rev() {
            let Some(info) = self.marks.mark_at(index) else {
                continue;
            };
            if let MarkKind::Syntax(state) = self.marks.kind(info.id)? {
                if state.is_some() || !known {
                    return Ok((info, *state));
                }
            }
        }
        let index = self.marks.index(self.start_checkpoint)?;
        let info = self
            .marks
            .mark_at(index)
            .ok_or(Error::InvalidMark(self.start_checkpoint))?;
        Ok((info, Some(LexState::default())))
    }

    /// First checkpoint at or after the mark with global index `from`.
    fn next_checkpoint(&self, from: usize) -> Option<MarkInfo> {
        self.marks
            .iter_from(from)
            .find(|info| self.marks.kind(info.id).is_ok_and(MarkKind::is_syntax))
    }

    // ==================== Tokens ====================

    /// Tokens overlapping `start..end`, lexed from the nearest checkpoint.
    pub fn tokens(&self, start: usize, end: usize) -> Result<Vec<Token>>
    where
        L: Clone,
    {
        let len = self.len();
        if start > end || end > len {
            return Err(Error::BadLocation {
                offset: end.max(start),
                limit: len,
            });
        }
        let (checkpoint, state) = self.checkpoint_within(self.marks.count_before(start + 1), true)?;
        let state = state.unwrap_or_default();
        let restart = checkpoint.offset - state.pre_scan;

        let mut lexer = self.lexer.clone();
        lexer.load_state(&state, restart);
        let mut feed = TextFeed::new(self.config.rescan_chunk);
        feed.load(&self.store, restart)?;
        let mut boundary = restart;
        let mut tokens = Vec::new();
        loop {
            match lexer.next_token(&feed.input()) {
                Lexeme::Token(token) => {
                    if token.start >= end {
                        break;
                    }
                    if token.end > start {
                        tokens.push(token);
                    }
                    boundary = token.end;
                }
                Lexeme::NeedInput => feed.refill(&self.store, boundary)?,
                Lexeme::EndOfText => break,
            }
        }
        Ok(tokens)
    }
}

impl<S: CharStore> DocumentOps<S, StandardLexer> {
    pub fn language(&self) -> Language {
        self.lexer.language()
    }

    /// Switches the lexer language and re-lexes the whole document.
    pub fn set_language(&mut self, language: Language) -> Result<()> {
        if self.lexer.language() == language {
            return Ok(());
        }
        self.lexer.set_language(language);
        let stale: Vec<MarkId> = self
            .checkpoints()
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != self.start_checkpoint)
            .collect();
        for id in stale {
            *self.marks.kind_mut(id)? = MarkKind::Syntax(None);
        }
        let len = self.len();
        let stop = self.rescan_from(self.start_checkpoint, len, len)?;
        log::debug!("language set to {}, rescan {:?}", language.name(), stop);
        Ok(())
    }
}

fn count_line_feeds(text: &str) -> usize {
    bytecount::count(text.as_bytes(), b'\n')
}
