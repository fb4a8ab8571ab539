//! Consensus recall: re-deriving each consensus base from the reads that
//! cover its column.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::lookup::SharedQualities;
use crate::core::read::AssembledRead;
use crate::core::sequence::GappedSequence;
use crate::core::types::Direction;

/// One read's contribution to a consensus column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceElement {
    pub base: u8,
    pub quality: u8,
    pub direction: Direction,
}

/// Calls a consensus base from one column of read bases.
///
/// `current` is the base the consensus has now. Columns with no coverage
/// are never passed to a caller.
pub trait ConsensusCaller: Send + Sync {
    fn call(&self, column: &[SliceElement], current: u8) -> u8;
}

impl<F> ConsensusCaller for F
where
    F: Fn(&[SliceElement], u8) -> u8 + Send + Sync,
{
    fn call(&self, column: &[SliceElement], current: u8) -> u8 {
        self(column, current)
    }
}

/// Picks the base with the highest summed quality, then the highest count.
/// Ties keep the current consensus base when it is among the leaders.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostFrequentBaseCaller;

impl ConsensusCaller for MostFrequentBaseCaller {
    fn call(&self, column: &[SliceElement], current: u8) -> u8 {
        let mut votes: HashMap<u8, (u64, usize)> = HashMap::new();
        for element in column {
            let entry = votes.entry(element.base.to_ascii_uppercase()).or_default();
            entry.0 += u64::from(element.quality);
            entry.1 += 1;
        }

        let Some(best) = votes.values().copied().max() else {
            return current;
        };
        let current = current.to_ascii_uppercase();
        if votes.get(&current) == Some(&best) {
            return current;
        }
        votes
            .iter()
            .filter(|(_, &score)| score == best)
            .map(|(&base, _)| base)
            .min()
            .unwrap_or(current)
    }
}

/// Quality given to a pad inside a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapQualityStrategy {
    #[default]
    AlwaysZero,
    /// Lower of the two flanking base qualities
    LowestFlanking,
}

impl GapQualityStrategy {
    #[must_use]
    pub fn gap_quality(self, left: Option<u8>, right: Option<u8>) -> u8 {
        match self {
            Self::AlwaysZero => 0,
            Self::LowestFlanking => match (left, right) {
                (Some(l), Some(r)) => l.min(r),
                (Some(q), None) | (None, Some(q)) => q,
                (None, None) => 0,
            },
        }
    }
}

/// Everything needed to recompute a consensus
#[derive(Clone)]
pub struct ConsensusRecall {
    caller: Arc<dyn ConsensusCaller>,
    qualities: Option<SharedQualities>,
    gap_strategy: GapQualityStrategy,
}

impl std::fmt::Debug for ConsensusRecall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusRecall")
            .field("has_qualities", &self.qualities.is_some())
            .field("gap_strategy", &self.gap_strategy)
            .finish_non_exhaustive()
    }
}

impl ConsensusRecall {
    pub fn new(caller: impl ConsensusCaller + 'static) -> Self {
        Self {
            caller: Arc::new(caller),
            qualities: None,
            gap_strategy: GapQualityStrategy::default(),
        }
    }

    /// Read qualities for the slice elements; without them every element
    /// has quality 0
    #[must_use]
    pub fn with_qualities(mut self, qualities: SharedQualities) -> Self {
        self.qualities = Some(qualities);
        self
    }

    #[must_use]
    pub fn with_gap_strategy(mut self, gap_strategy: GapQualityStrategy) -> Self {
        self.gap_strategy = gap_strategy;
        self
    }

    #[must_use]
    pub fn gap_strategy(&self) -> GapQualityStrategy {
        self.gap_strategy
    }

    /// Recall every covered column of `consensus`
    #[must_use]
    pub fn recall(&self, consensus: &GappedSequence, reads: &[AssembledRead]) -> GappedSequence {
        let mut columns: Vec<Vec<SliceElement>> = vec![Vec::new(); consensus.len()];

        for read in reads {
            let qualities = self.qualities.as_ref().and_then(|lookup| {
                lookup.qualities(read.id()).map(|full| {
                    read.gapped_qualities(full, |left, right| self.gap_strategy.gap_quality(left, right))
                })
            });

            for (i, &base) in read.bases().as_bytes().iter().enumerate() {
                let Ok(column) = usize::try_from(read.offset() + crate::core::types::to_i64(i)) else {
                    continue;
                };
                let Some(slot) = columns.get_mut(column) else {
                    continue;
                };
                slot.push(SliceElement {
                    base,
                    quality: qualities.as_ref().map_or(0, |q| q[i]),
                    direction: read.direction(),
                });
            }
        }

        let bases: Vec<u8> = consensus
            .as_bytes()
            .iter()
            .zip(&columns)
            .map(|(&current, column)| {
                if column.is_empty() {
                    current
                } else {
                    self.caller.call(column, current)
                }
            })
            .collect();
        GappedSequence::new(bases)
    }
}
