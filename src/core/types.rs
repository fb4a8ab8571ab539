use serde::{Deserialize, Serialize};

/// Phred value at or above which a base is written in uppercase
pub const HIGH_QUALITY_THRESHOLD: u8 = 26;

/// Highest consensus quality the consed algorithm will report
pub const MAX_CONSENSUS_QUALITY: u8 = 90;

/// Quality used for consensus positions when nothing better is known
pub const DEFAULT_CONSENSUS_QUALITY: u8 = 30;

/// Pad character used in gapped sequences
pub const GAP: u8 = b'*';

/// Orientation of a read relative to the consensus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Parse the `U`/`C` flag used by `CO` and `AF` records
    #[must_use]
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "U" => Some(Self::Forward),
            "C" => Some(Self::Reverse),
            _ => None,
        }
    }

    #[must_use]
    pub fn flag(self) -> char {
        match self {
            Self::Forward => 'U',
            Self::Reverse => 'C',
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.flag())
    }
}

/// A 0-based, inclusive coordinate range.
///
/// Offsets are signed because `AF` placements may start before the first
/// consensus base. An empty range has `end == begin - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub begin: i64,
    pub end: i64,
}

impl Range {
    #[must_use]
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    /// Range starting at `begin` covering `length` positions
    #[must_use]
    pub fn of_length(begin: i64, length: usize) -> Self {
        Self {
            begin,
            end: begin + to_i64(length) - 1,
        }
    }

    /// Convert 1-based inclusive file coordinates
    #[must_use]
    pub fn from_one_based(begin: i64, end: i64) -> Self {
        Self {
            begin: begin - 1,
            end: end - 1,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.end - self.begin + 1).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.begin
    }

    #[must_use]
    pub fn contains(&self, offset: i64) -> bool {
        offset >= self.begin && offset <= self.end
    }

    #[must_use]
    pub fn intersects(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.begin <= other.end && other.begin <= self.end
    }

    /// Overlap of two ranges, `None` when they do not intersect
    #[must_use]
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if self.intersects(other) {
            Some(Range::new(
                self.begin.max(other.begin),
                self.end.min(other.end),
            ))
        } else {
            None
        }
    }

    #[must_use]
    pub fn shift(&self, amount: i64) -> Range {
        Range::new(self.begin + amount, self.end + amount)
    }

    /// Smallest range covering both
    #[must_use]
    pub fn union(&self, other: &Range) -> Range {
        Range::new(self.begin.min(other.begin), self.end.max(other.end))
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

/// Helper to convert a length into a signed offset
#[inline]
#[must_use]
pub fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
