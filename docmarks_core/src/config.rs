//! Document tuning knobs.

use crate::error::{Error, Result};

/// Default spacing used when new syntax checkpoints are placed.
pub const MARK_DISTANCE: usize = 100;

/// Checkpoints closer than this are thinned out.
pub const MIN_MARK_DISTANCE: usize = 50;

/// Gaps wider than this get new checkpoints.
pub const MAX_MARK_DISTANCE: usize = 150;

/// Number of characters fetched from the store per lexer refill.
pub const RESCAN_CHUNK: usize = 512;

/// Configuration of one document's syntax checkpoint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentConfig {
    /// Spacing of freshly placed checkpoints.
    pub mark_distance: usize,
    /// Lower bound on the distance between adjacent checkpoints.
    pub min_mark_distance: usize,
    /// Upper bound on the distance between adjacent checkpoints.
    pub max_mark_distance: usize,
    /// Initial window size, in characters, read for each rescan step.
    pub rescan_chunk: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            mark_distance: MARK_DISTANCE,
            min_mark_distance: MIN_MARK_DISTANCE,
            max_mark_distance: MAX_MARK_DISTANCE,
            rescan_chunk: RESCAN_CHUNK,
        }
    }
}

impl DocumentConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the checkpoint spacing.
    pub fn with_mark_distance(mut self, distance: usize) -> Self {
        self.mark_distance = distance;
        self
    }

    /// Sets the lower spacing bound.
    pub fn with_min_mark_distance(mut self, distance: usize) -> Self {
        self.min_mark_distance = distance;
        self
    }

    /// Sets the upper spacing bound.
    pub fn with_max_mark_distance(mut self, distance: usize) -> Self {
        self.max_mark_distance = distance;
        self
    }

    /// Sets the rescan read window.
    pub fn with_rescan_chunk(mut self, chunk: usize) -> Self {
        self.rescan_chunk = chunk;
        self
    }

    /// Checks that the bounds can always be satisfied.
    ///
    /// Evenly splitting a gap just above `max_mark_distance` into pieces of at
    /// most `mark_distance` must never produce a piece below
    /// `min_mark_distance`, which holds when `min <= mark / 2 <= max / 2`.
    pub fn validate(&self) -> Result<()> {
        if self.min_mark_distance == 0 {
            return Err(Error::Config("min_mark_distance must be positive".into()));
        }
        if self.min_mark_distance * 2 > self.mark_distance {
            return Err(Error::Config(format!(
                "min_mark_distance {} exceeds half of mark_distance {}",
                self.min_mark_distance, self.mark_distance
            )));
        }
        if self.mark_distance > self.max_mark_distance {
            return Err(Error::Config(format!(
                "mark_distance {} exceeds max_mark_distance {}",
                self.mark_distance, self.max_mark_distance
            )));
        }
        if self.rescan_chunk == 0 {
            return Err(Error::Config("rescan_chunk must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DocumentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = DocumentConfig::new()
            .with_mark_distance(200)
            .with_max_mark_distance(150);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_dense_minimum() {
        let config = DocumentConfig::new().with_min_mark_distance(80);
        assert!(config.validate().is_err());

        let config = DocumentConfig::new().with_min_mark_distance(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_chunk() {
        let config = DocumentConfig::new().with_rescan_chunk(0);
        assert!(config.validate().is_err());
    }
}
