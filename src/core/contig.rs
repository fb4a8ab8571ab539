use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::read::AssembledRead;
use crate::core::sequence::GappedSequence;

/// An assembled contig: gapped consensus, its qualities, and placed reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    id: String,

    consensus: GappedSequence,

    /// One value per ungapped consensus base
    consensus_quality: Vec<u8>,

    complemented: bool,

    /// Reads ordered by (gapped start, id)
    reads: Vec<AssembledRead>,

    read_index: HashMap<String, usize>,
}

impl Contig {
    pub(crate) fn new(
        id: String,
        consensus: GappedSequence,
        consensus_quality: Vec<u8>,
        complemented: bool,
        reads: Vec<AssembledRead>,
    ) -> Self {
        let read_index = reads
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().to_string(), i))
            .collect();
        Self {
            id,
            consensus,
            consensus_quality,
            complemented,
            reads,
            read_index,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn consensus(&self) -> &GappedSequence {
        &self.consensus
    }

    #[must_use]
    pub fn consensus_quality(&self) -> &[u8] {
        &self.consensus_quality
    }

    #[must_use]
    pub fn is_complemented(&self) -> bool {
        self.complemented
    }

    /// Reads in legacy write order
    #[must_use]
    pub fn reads(&self) -> &[AssembledRead] {
        &self.reads
    }

    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }

    #[must_use]
    pub fn read(&self, id: &str) -> Option<&AssembledRead> {
        self.read_index.get(id).map(|&i| &self.reads[i])
    }

    #[must_use]
    pub fn contains_read(&self, id: &str) -> bool {
        self.read_index.contains_key(id)
    }

    /// Per-column quality for the gapped consensus; pads borrow the
    /// quality of the preceding base (or the following one at the start)
    #[must_use]
    pub fn gapped_consensus_quality(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.consensus.len());
        let mut ungapped = 0usize;
        for &base in self.consensus.as_bytes() {
            if base == crate::core::types::GAP {
                let q = ungapped
                    .checked_sub(1)
                    .and_then(|i| self.consensus_quality.get(i))
                    .or_else(|| self.consensus_quality.get(ungapped))
                    .copied()
                    .unwrap_or(0);
                out.push(q);
            } else {
                out.push(self.consensus_quality.get(ungapped).copied().unwrap_or(0));
                ungapped += 1;
            }
        }
        out
    }
}

/// Compact per-contig summary used for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigSummary {
    pub id: String,
    pub gapped_length: usize,
    pub ungapped_length: usize,
    pub num_reads: usize,
    pub complemented: bool,
    pub mean_consensus_quality: u8,
}

impl From<&Contig> for ContigSummary {
    fn from(contig: &Contig) -> Self {
        let quals = contig.consensus_quality();
        let mean = if quals.is_empty() {
            0
        } else {
            let total: u64 = quals.iter().map(|&q| u64::from(q)).sum();
            u8::try_from(total / quals.len() as u64).unwrap_or(u8::MAX)
        };
        Self {
            id: contig.id().to_string(),
            gapped_length: contig.consensus().len(),
            ungapped_length: contig.consensus().ungapped_len(),
            num_reads: contig.num_reads(),
            complemented: contig.is_complemented(),
            mean_consensus_quality: mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::read::TraceInfo;
    use crate::core::types::{Direction, Range};

    fn sample() -> Contig {
        let read = AssembledRead::new(
            "r1".to_string(),
            GappedSequence::new("AC*G"),
            0,
            Direction::Forward,
            Range::new(0, 2),
            3,
            TraceInfo::for_read("r1"),
        );
        Contig::new(
            "ctg".to_string(),
            GappedSequence::new("AC*G"),
            vec![10, 20, 30],
            false,
            vec![read],
        )
    }

    #[test]
    fn test_read_lookup() {
        let contig = sample();
        assert!(contig.contains_read("r1"));
        assert_eq!(contig.read("r1").map(AssembledRead::offset), Some(0));
        assert!(contig.read("missing").is_none());
    }

    #[test]
    fn test_gapped_consensus_quality() {
        assert_eq!(sample().gapped_consensus_quality(), vec![10, 20, 20, 30]);
    }

    #[test]
    fn test_summary() {
        let summary = ContigSummary::from(&sample());
        assert_eq!(summary.gapped_length, 4);
        assert_eq!(summary.ungapped_length, 3);
        assert_eq!(summary.mean_consensus_quality, 20);
    }
}
