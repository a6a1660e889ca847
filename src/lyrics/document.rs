//! Time-indexed lyrics
//!
//! A `TimedLyricsDocument` is a sorted run of non-overlapping spans keyed by
//! playback offset. Gaps between spans are fine; overlaps are not.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One span of lyrics text, active for `start_ms <= t < end_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricUnit {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl LyricUnit {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    pub fn contains(&self, position_ms: u64) -> bool {
        self.start_ms <= position_ms && position_ms < self.end_ms
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidDocumentError {
    #[error("unit {index} has an empty span ({start_ms}..{end_ms})")]
    EmptySpan {
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },
    #[error("unit {index} starts at {start_ms}, before the previous unit ends at {previous_end_ms}")]
    Overlap {
        index: usize,
        start_ms: u64,
        previous_end_ms: u64,
    },
}

/// Ordered lyric units. Construction does not validate; `validate` does,
/// and the synchronizer refuses documents that fail it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimedLyricsDocument {
    units: Vec<LyricUnit>,
}

impl TimedLyricsDocument {
    pub fn new(units: Vec<LyricUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[LyricUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LyricUnit> {
        self.units.get(index)
    }

    /// End of the last unit, if any.
    pub fn end_ms(&self) -> Option<u64> {
        self.units.last().map(|u| u.end_ms)
    }

    /// Checks spans are non-empty, sorted and non-overlapping.
    pub fn validate(&self) -> Result<(), InvalidDocumentError> {
        for (index, unit) in self.units.iter().enumerate() {
            if unit.end_ms <= unit.start_ms {
                return Err(InvalidDocumentError::EmptySpan {
                    index,
                    start_ms: unit.start_ms,
                    end_ms: unit.end_ms,
                });
            }
            if index > 0 {
                let previous = &self.units[index - 1];
                // Covers unsorted input too: a unit that starts before its
                // predecessor necessarily starts before that predecessor ends.
                if unit.start_ms < previous.end_ms {
                    return Err(InvalidDocumentError::Overlap {
                        index,
                        start_ms: unit.start_ms,
                        previous_end_ms: previous.end_ms,
                    });
                }
            }
        }
        Ok(())
    }

    /// Index of the last unit starting at or before `position_ms`.
    ///
    /// `None` when the position precedes the first unit. O(log n).
    pub fn last_started(&self, position_ms: u64) -> Option<usize> {
        let started = self.units.partition_point(|u| u.start_ms <= position_ms);
        started.checked_sub(1)
    }
}
