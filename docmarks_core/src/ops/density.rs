//! Spacing of syntax checkpoints.
//!
//! Adjacent checkpoints stay between `min_mark_distance` and
//! `max_mark_distance` apart. The segment from the last checkpoint to the end
//! of the document only has to respect the upper bound.

use super::DocumentOps;
use crate::buffer::CharStore;
use crate::error::Result;
use crate::mark::{MarkInfo, MarkKind};
use crate::syntax::Lexer;

impl<S: CharStore, L: Lexer> DocumentOps<S, L> {
    /// Re-spaces the checkpoints around an edit covering `start..end`.
    ///
    /// Walks from the last checkpoint before `start` to the first kept
    /// checkpoint after `end`, dropping checkpoints that sit too close to
    /// their left neighbour and splitting gaps that grew too wide. Returns the
    /// offset the following rescan has to reach before it may stop early.
    pub fn ensure_syntax_mark_density(&mut self, start: usize, end: usize) -> Result<usize> {
        let min = self.config.min_mark_distance;
        let max = self.config.max_mark_distance;
        let (mut prev, _) = self.checkpoint_within(self.marks.count_before(start), false)?;
        let mut dirty_until = end;
        let (mut added, mut removed) = (0usize, 0usize);
        loop {
            let from = self.marks.index(prev.id)? + 1;
            let Some(next) = self.next_checkpoint(from) else {
                added += self.fill_tail(prev, &mut dirty_until)?;
                break;
            };
            let gap = next.offset - prev.offset;
            if gap < min {
                self.marks.remove(next.id)?;
                removed += 1;
                continue;
            }
            if gap > max {
                added += self.fill_gap(prev, next, &mut dirty_until)?;
            }
            if next.offset > end {
                break;
            }
            prev = next;
        }
        if added + removed > 0 {
            log::debug!(
                "checkpoints around {}..{}: {} added, {} removed",
                start,
                end,
                added,
                removed
            );
        }
        Ok(dirty_until)
    }

    /// Splits the gap between two checkpoints into even pieces no longer
    /// than `mark_distance`.
    fn fill_gap(&mut self, prev: MarkInfo, next: MarkInfo, dirty_until: &mut usize) -> Result<usize> {
        let gap = next.offset - prev.offset;
        let pieces = gap.div_ceil(self.config.mark_distance);
        let targets: Vec<usize> = (1..pieces).map(|k| gap * k / pieces).collect();
        self.place_checkpoints(prev, &targets, dirty_until)?;
        Ok(targets.len())
    }

    /// Adds checkpoints every `mark_distance` after the last one until the
    /// remaining tail fits under `max_mark_distance`.
    fn fill_tail(&mut self, last: MarkInfo, dirty_until: &mut usize) -> Result<usize> {
        let tail = self.len() - last.offset;
        let max = self.config.max_mark_distance;
        if tail <= max {
            return Ok(0);
        }
        let step = self.config.mark_distance;
        let count = (tail - max).div_ceil(step);
        let targets: Vec<usize> = (1..=count).map(|k| k * step).collect();
        self.place_checkpoints(last, &targets, dirty_until)?;
        Ok(count)
    }

    /// Inserts unscanned checkpoints at `from.offset + target` for each
    /// ascending target.
    fn place_checkpoints(&mut self, from: MarkInfo, targets: &[usize], dirty_until: &mut usize) -> Result<()> {
        let Some(&furthest) = targets.last() else {
            return Ok(());
        };
        let text = self.store.read(from.offset, furthest)?;
        let mut chars = text.chars();
        let mut line = from.line;
        let mut consumed = 0;
        for &target in targets {
            while consumed < target {
                if chars.next() == Some('\n') {
                    line += 1;
                }
                consumed += 1;
            }
            self.marks
                .insert_new(from.offset + target, line, false, MarkKind::Syntax(None))?;
        }
        *dirty_until = (*dirty_until).max(from.offset + furthest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DocumentConfig;
    use crate::ops::DocumentOps;
    use crate::syntax::{Language, StandardLexer};
    use crate::TextBuffer;

    fn gaps(ops: &DocumentOps) -> Vec<usize> {
        let offsets: Vec<usize> = ops.checkpoints().iter().map(|c| c.offset).collect();
        offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn assert_density(ops: &DocumentOps) {
        let config = ops.config();
        for gap in gaps(ops) {
            assert!(gap >= config.min_mark_distance, "gap {gap} too small");
            assert!(gap <= config.max_mark_distance, "gap {gap} too large");
        }
        let last = ops.checkpoints().last().map(|c| c.offset).unwrap_or(0);
        assert!(ops.len() - last <= config.max_mark_distance);
    }

    #[test]
    fn test_initial_placement() {
        let ops = DocumentOps::from_text(&"a".repeat(1_000), Language::PlainText);
        let offsets: Vec<usize> = ops.checkpoints().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, (0..=900).step_by(100).collect::<Vec<_>>());
        assert_density(&ops);
    }

    #[test]
    fn test_short_document_keeps_only_start() {
        let ops = DocumentOps::from_text("tiny", Language::PlainText);
        assert_eq!(ops.checkpoints().len(), 1);
    }

    #[test]
    fn test_large_insert_splits_gap() {
        let mut ops = DocumentOps::from_text(&"a".repeat(1_000), Language::PlainText);
        ops.insert_text(450, &"b".repeat(700)).unwrap();
        assert_density(&ops);
    }

    #[test]
    fn test_large_remove_thins_out() {
        let mut ops = DocumentOps::from_text(&"a".repeat(1_000), Language::PlainText);
        ops.remove_text(120, 500).unwrap();
        assert_density(&ops);
        assert_eq!(ops.len(), 500);
    }

    #[test]
    fn test_small_removals_merge_neighbours() {
        let mut ops = DocumentOps::from_text(&"a".repeat(1_000), Language::PlainText);
        for _ in 0..16 {
            ops.remove_text(290, 5).unwrap();
        }
        assert_density(&ops);
        assert_eq!(ops.checkpoints().len(), 9);
    }

    #[test]
    fn test_custom_distances() {
        let config = DocumentConfig::new()
            .with_mark_distance(20)
            .with_min_mark_distance(10)
            .with_max_mark_distance(30);
        let ops = DocumentOps::with_parts(
            TextBuffer::from_str(&"x\n".repeat(100)),
            StandardLexer::new(Language::PlainText),
            config,
        )
        .unwrap();
        assert_eq!(ops.checkpoints().len(), 10);
        // Lines are tracked for the new checkpoints too.
        for checkpoint in ops.checkpoints() {
            assert_eq!(checkpoint.line, checkpoint.offset / 2);
        }
    }
}
