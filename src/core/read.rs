use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::sequence::GappedSequence;
use crate::core::types::{to_i64, Direction, Range, GAP};

/// Provenance of a read, taken from its `DS` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceInfo {
    /// `CHROMAT_FILE:` value
    pub chromat_file: String,

    /// `PHD_FILE:` value
    pub phd_file: String,

    /// `TIME:` value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

impl TraceInfo {
    #[must_use]
    pub fn new(chromat_file: impl Into<String>, phd_file: impl Into<String>) -> Self {
        Self {
            chromat_file: chromat_file.into(),
            phd_file: phd_file.into(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Provenance assumed for a read without a `DS` line
    #[must_use]
    pub fn for_read(read_id: &str) -> Self {
        Self::new(read_id, format!("{read_id}.phd.1"))
    }
}

/// A read as placed in a contig. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledRead {
    id: String,
    bases: GappedSequence,
    offset: i64,
    direction: Direction,
    valid_range: Range,
    full_length: usize,
    trace: TraceInfo,
}

impl AssembledRead {
    pub(crate) fn new(
        id: String,
        bases: GappedSequence,
        offset: i64,
        direction: Direction,
        valid_range: Range,
        full_length: usize,
        trace: TraceInfo,
    ) -> Self {
        Self {
            id,
            bases,
            offset,
            direction,
            valid_range,
            full_length,
            trace,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gapped bases of the valid range, in consensus orientation
    #[must_use]
    pub fn bases(&self) -> &GappedSequence {
        &self.bases
    }

    /// Gapped start offset on the consensus
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Gapped end offset on the consensus, inclusive
    #[must_use]
    pub fn end(&self) -> i64 {
        self.offset + to_i64(self.bases.len()) - 1
    }

    #[must_use]
    pub fn gapped_range(&self) -> Range {
        self.bases.range_at(self.offset)
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Ungapped valid range into the original, full-length read
    #[must_use]
    pub fn valid_range(&self) -> Range {
        self.valid_range
    }

    /// Ungapped length of the original read
    #[must_use]
    pub fn full_length(&self) -> usize {
        self.full_length
    }

    #[must_use]
    pub fn trace(&self) -> &TraceInfo {
        &self.trace
    }

    /// Base aligned to a gapped consensus offset, if the read covers it
    #[must_use]
    pub fn base_at(&self, consensus_offset: i64) -> Option<u8> {
        let local = usize::try_from(consensus_offset - self.offset).ok()?;
        self.bases.get(local)
    }

    /// Index into the full-length, original-orientation read for a gapped
    /// offset within this read. `None` for pads.
    #[must_use]
    pub fn full_read_index(&self, gapped_offset: usize) -> Option<usize> {
        if self.bases.is_gap(gapped_offset) || gapped_offset >= self.bases.len() {
            return None;
        }
        let ungapped = to_i64(self.bases.ungapped_offset(gapped_offset));
        let index = match self.direction {
            Direction::Forward => self.valid_range.begin + ungapped,
            Direction::Reverse => self.valid_range.end - ungapped,
        };
        usize::try_from(index).ok()
    }

    /// Per-base qualities for the gapped valid bases.
    ///
    /// `full_qualities` are the qualities of the original read in its own
    /// orientation; pads get `gap_quality` applied to the flanking values.
    #[must_use]
    pub fn gapped_qualities(
        &self,
        full_qualities: &[u8],
        gap_quality: impl Fn(Option<u8>, Option<u8>) -> u8,
    ) -> Vec<u8> {
        let raw: Vec<Option<u8>> = (0..self.bases.len())
            .map(|i| {
                self.full_read_index(i)
                    .map(|idx| full_qualities.get(idx).copied().unwrap_or(0))
            })
            .collect();

        raw.iter()
            .enumerate()
            .map(|(i, q)| match q {
                Some(q) => *q,
                None => {
                    let left = raw[..i].iter().rev().find_map(|q| *q);
                    let right = raw[i + 1..].iter().find_map(|q| *q);
                    gap_quality(left, right)
                }
            })
            .collect()
    }

    /// True when the read holds at least one real base
    #[must_use]
    pub fn has_bases(&self) -> bool {
        self.bases.as_bytes().iter().any(|&b| b != GAP)
    }
}
