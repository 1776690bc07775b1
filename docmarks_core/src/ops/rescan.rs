//! Incremental re-lexing after an edit.
//!
//! Lexing restarts at the checkpoint left of the edit and walks forward,
//! refreshing the state saved in every checkpoint it passes. It stops at the
//! first checkpoint past the edited region whose saved state already equals
//! the freshly computed one: from there on the old lexing result is valid.

use super::DocumentOps;
use crate::buffer::CharStore;
use crate::edit::DocumentEdit;
use crate::error::{Error, Result};
use crate::mark::{MarkId, MarkInfo, MarkKind};
use crate::syntax::{LexInput, LexState, Lexeme, Lexer};

/// Where and why a rescan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanStop {
    /// A checkpoint already held the recomputed state.
    StateMatchFound(usize),
    /// No checkpoint was left to refresh.
    EndOfDocument(usize),
}

impl RescanStop {
    /// Offset at which lexing stopped.
    pub fn offset(&self) -> usize {
        match self {
            Self::StateMatchFound(offset) | Self::EndOfDocument(offset) => *offset,
        }
    }
}

/// Window of document characters fed to a lexer.
pub(super) struct TextFeed {
    buf: Vec<char>,
    start: usize,
    chunk: usize,
    last: bool,
}

impl TextFeed {
    pub fn new(chunk: usize) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            chunk: chunk.max(1),
            last: false,
        }
    }

    /// Reads the window starting at `from`.
    pub fn load(&mut self, store: &impl CharStore, from: usize) -> Result<()> {
        let len = store.len();
        let take = self.chunk.min(len.saturating_sub(from));
        store.read_chars(from, take, &mut self.buf)?;
        self.start = from;
        self.last = from + take == len;
        Ok(())
    }

    /// Moves the window to `boundary`, growing it if the lexer made no
    /// progress in the current one.
    pub fn refill(&mut self, store: &impl CharStore, boundary: usize) -> Result<()> {
        if boundary == self.start {
            self.chunk = self.chunk.saturating_mul(2);
        }
        self.load(store, boundary)
    }

    pub fn input(&self) -> LexInput<'_> {
        LexInput {
            chars: &self.buf,
            offset: self.start,
            last: self.last,
        }
    }
}

impl<S: CharStore, L: Lexer> DocumentOps<S, L> {
    /// Re-lexes from checkpoint `left` after `edit` and records where the
    /// rescan stopped in `edit.syntax_update_offset`.
    ///
    /// The rescan will not stop before `dirty_until`.
    pub fn rescan_syntax(&mut self, left: MarkId, edit: &mut DocumentEdit, dirty_until: usize) -> Result<RescanStop> {
        let edit_end = if edit.is_insert() { edit.end() } else { edit.offset };
        let stop = self.rescan_from(left, edit_end, dirty_until)?;
        edit.syntax_update_offset = Some(stop.offset());
        Ok(stop)
    }

    pub(super) fn rescan_from(&mut self, left: MarkId, edit_end: usize, dirty_until: usize) -> Result<RescanStop> {
        if !self.marks.kind(left)?.is_syntax() {
            return Err(Error::InvalidMark(left));
        }
        // A checkpoint without a state cannot be resumed from; fall back to
        // the closest one that has one.
        let (start, state) = self.checkpoint_within(self.marks.index(left)? + 1, true)?;
        let state = state.unwrap_or_default();
        let restart = start.offset - state.pre_scan;

        self.lexer.load_state(&state, restart);
        let mut feed = TextFeed::new(self.config.rescan_chunk);
        feed.load(&self.store, restart)?;
        let mut boundary = restart;
        let mut before = LexState::new(state.mode, 0);
        let mut pending = self.next_checkpoint(self.marks.index(start.id)? + 1);
        let mut refreshed = 0usize;

        let stop = 'scan: loop {
            let Some(checkpoint) = pending else {
                break RescanStop::EndOfDocument(boundary);
            };
            match self.lexer.next_token(&feed.input()) {
                Lexeme::Token(token) => {
                    // Every checkpoint inside the token resumes at its start.
                    let mut next = Some(checkpoint);
                    while let Some(cp) = next.filter(|cp| cp.offset < token.end) {
                        let fresh = LexState::new(before.mode, cp.offset.saturating_sub(token.start));
                        if self.record(&cp, fresh, edit_end, dirty_until)? {
                            break 'scan RescanStop::StateMatchFound(cp.offset);
                        }
                        refreshed += 1;
                        next = self.next_checkpoint(self.marks.index(cp.id)? + 1);
                    }
                    pending = next;
                    boundary = token.end;
                    before = self.lexer.current_state();
                }
                Lexeme::NeedInput => feed.refill(&self.store, boundary)?,
                Lexeme::EndOfText => {
                    let mut next = Some(checkpoint);
                    while let Some(cp) = next {
                        let fresh = LexState::new(before.mode, cp.offset.saturating_sub(boundary));
                        if self.record(&cp, fresh, edit_end, dirty_until)? {
                            break 'scan RescanStop::StateMatchFound(cp.offset);
                        }
                        refreshed += 1;
                        next = self.next_checkpoint(self.marks.index(cp.id)? + 1);
                    }
                    break RescanStop::EndOfDocument(boundary);
                }
            }
        };
        log::debug!(
            "rescan from {} refreshed {} checkpoints, stopped: {:?}",
            restart,
            refreshed,
            stop
        );
        Ok(stop)
    }

    /// Stores `fresh` in a checkpoint. Returns true instead if the checkpoint
    /// lies past the edit and already holds an equal state.
    fn record(&mut self, checkpoint: &MarkInfo, fresh: LexState, edit_end: usize, dirty_until: usize) -> Result<bool> {
        let settled =
            checkpoint.offset - fresh.pre_scan >= edit_end && checkpoint.offset >= dirty_until;
        let kind = self.marks.kind_mut(checkpoint.id)?;
        if let MarkKind::Syntax(Some(stored)) = kind {
            if settled && self.lexer.state_equals(stored, &fresh) {
                return Ok(true);
            }
        }
        *kind = MarkKind::Syntax(Some(fresh));
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::config::DocumentConfig;
    use crate::ops::DocumentOps;
    use crate::syntax::{Language, LexMode, StandardLexer};

    fn rust_doc(text: &str) -> DocumentOps {
        DocumentOps::from_text(text, Language::Rust)
    }

    fn modes(ops: &DocumentOps) -> Vec<LexMode> {
        ops.checkpoints()
            .iter()
            .map(|c| c.state.map(|s| s.mode).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_edit_far_from_change_stops_early() {
        let text = "let x = 1;\n".repeat(200);
        let mut ops = rust_doc(&text);
        let edit = ops.insert_text(500, "y").unwrap();
        let stop = edit.syntax_update_offset.unwrap();
        assert!(stop > 500);
        assert!(stop < 800, "rescan ran to {stop}");
    }

    #[test]
    fn test_opening_comment_propagates() {
        let text = "let x = 1;\n".repeat(100);
        let mut ops = rust_doc(&text);
        assert!(modes(&ops).iter().all(|m| *m == LexMode::Normal));

        let edit = ops.insert_text(0, "/*").unwrap();
        let last = ops.checkpoints().last().unwrap().offset;
        assert!(edit.syntax_update_offset.unwrap() > last);
        assert!(modes(&ops)[1..]
            .iter()
            .all(|m| *m == LexMode::BlockComment { depth: 1 }));

        // Closing it again restores normal states.
        let edit = ops.remove_text(0, 2).unwrap();
        let last = ops.checkpoints().last().unwrap().offset;
        assert!(edit.syntax_update_offset.unwrap() > last);
        assert!(modes(&ops).iter().all(|m| *m == LexMode::Normal));
    }

    #[test]
    fn test_pre_scan_points_at_token_start() {
        // One long word so that checkpoints fall inside a token.
        let text = "a".repeat(400);
        let ops = rust_doc(&text);
        for checkpoint in ops.checkpoints() {
            let state = checkpoint.state.unwrap();
            assert_eq!(state.pre_scan, checkpoint.offset, "restart must be the word start");
        }
    }

    #[test]
    fn test_small_chunks_still_scan_everything() {
        let config = DocumentConfig::new().with_rescan_chunk(3);
        let text = format!("/* {} */\n{}", "c".repeat(300), "x ".repeat(200));
        let ops = DocumentOps::with_parts(
            TextBuffer::from_str(&text),
            StandardLexer::new(Language::C),
            config,
        )
        .unwrap();
        let checkpoints = ops.checkpoints();
        assert!(checkpoints.iter().all(|c| c.state.is_some()));
        let inside = checkpoints.iter().find(|c| c.offset == 100).unwrap();
        assert_eq!(inside.state.unwrap().pre_scan, 100);
    }

    #[test]
    fn test_rescan_rejects_plain_mark() {
        let mut ops = rust_doc("fn main() {}");
        let plain = ops.create_mark(3, false, MarkKind::Plain).unwrap();
        let mut edit = DocumentEdit::insertion(0, 0, "");
        assert_eq!(
            ops.rescan_syntax(plain, &mut edit, 0),
            Err(Error::InvalidMark(plain))
        );
    }

    #[test]
    fn test_feed_grows_when_stuck() {
        let store = TextBuffer::from_str("abcdefgh");
        let mut feed = TextFeed::new(2);
        feed.load(&store, 0).unwrap();
        assert_eq!(feed.input().chars, &['a', 'b']);
        feed.refill(&store, 0).unwrap();
        assert_eq!(feed.input().chars.len(), 4);
        feed.refill(&store, 4).unwrap();
        assert_eq!(feed.input().offset, 4);
        assert!(feed.input().last);
    }
}
