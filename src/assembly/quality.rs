//! Consensus quality recomputation, as consed does it.
//!
//! For each unpadded consensus base, a read counts only if it agrees with
//! the consensus across a small window around the base: two real bases on
//! each side, widened across pads and clipped at the contig ends. The
//! quality is the best forward read quality plus the best reverse read
//! quality, with a bonus when two reads on one strand start at different
//! offsets.

use crate::assembly::builder::BuildError;
use crate::core::lookup::QualityLookup;
use crate::core::read::AssembledRead;
use crate::core::sequence::GappedSequence;
use crate::core::types::{to_i64, Direction, Range, GAP, MAX_CONSENSUS_QUALITY};

/// Real bases required on each side of a column
const WINDOW_FLANK: usize = 2;

/// Added when a strand has independent (different start) support
const SAME_STRAND_BONUS: u32 = 5;

pub struct ConsensusQualityComputer<'a> {
    qualities: &'a dyn QualityLookup,
}

impl<'a> ConsensusQualityComputer<'a> {
    pub fn new(qualities: &'a dyn QualityLookup) -> Self {
        Self { qualities }
    }

    /// Ungapped consensus qualities for `consensus` given the placed reads
    ///
    /// # Errors
    ///
    /// Returns `BuildError::MissingQualities` if a read has no entry in the
    /// quality lookup.
    pub fn compute(&self, consensus: &GappedSequence, reads: &[AssembledRead]) -> Result<Vec<u8>, BuildError> {
        let read_qualities = reads
            .iter()
            .map(|read| {
                self.qualities
                    .qualities(read.id())
                    .ok_or_else(|| BuildError::MissingQualities(read.id().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let bases = consensus.as_bytes();
        let mut gapped = Vec::with_capacity(bases.len());
        for column in 0..bases.len() {
            if bases[column] == GAP {
                gapped.push(None);
                continue;
            }
            let window = window_around(bases, column);
            let mut support = StrandSupport::default();
            for (read, full_qualities) in reads.iter().zip(&read_qualities) {
                if let Some(quality) = column_quality(read, full_qualities, bases, column, &window) {
                    support.add(read.direction(), read.offset(), quality);
                }
            }
            gapped.push(Some(support.quality()));
        }

        // Drop pad columns back to front so earlier offsets stay valid
        for column in (0..gapped.len()).rev() {
            if gapped[column].is_none() {
                gapped.remove(column);
            }
        }
        Ok(gapped.into_iter().flatten().collect())
    }
}

/// Gapped window covering `WINDOW_FLANK` real bases on both sides
fn window_around(bases: &[u8], column: usize) -> Range {
    let mut begin = column;
    let mut found = 0;
    while found < WINDOW_FLANK && begin > 0 {
        begin -= 1;
        if bases[begin] != GAP {
            found += 1;
        }
    }
    while begin < column && bases[begin] == GAP {
        begin += 1;
    }

    let mut end = column;
    found = 0;
    while found < WINDOW_FLANK && end + 1 < bases.len() {
        end += 1;
        if bases[end] != GAP {
            found += 1;
        }
    }
    while end > column && bases[end] == GAP {
        end -= 1;
    }
    Range::new(to_i64(begin), to_i64(end))
}

/// Quality of `read` at `column`, or `None` when the read does not span
/// the window or disagrees with the consensus anywhere inside it
fn column_quality(
    read: &AssembledRead,
    full_qualities: &[u8],
    consensus: &[u8],
    column: usize,
    window: &Range,
) -> Option<u8> {
    if read.offset() > window.begin || read.end() < window.end {
        return None;
    }
    for offset in window.begin..=window.end {
        let expected = consensus[usize::try_from(offset).ok()?];
        if read.base_at(offset)?.to_ascii_uppercase() != expected {
            return None;
        }
    }
    let local = usize::try_from(to_i64(column) - read.offset()).ok()?;
    let index = read.full_read_index(local)?;
    full_qualities.get(index).copied()
}

#[derive(Default)]
struct StrandSupport {
    best_forward: Option<u8>,
    best_reverse: Option<u8>,
    forward_start: Option<i64>,
    reverse_start: Option<i64>,
    independent: bool,
}

impl StrandSupport {
    fn add(&mut self, direction: Direction, start: i64, quality: u8) {
        let (best, first_start) = match direction {
            Direction::Forward => (&mut self.best_forward, &mut self.forward_start),
            Direction::Reverse => (&mut self.best_reverse, &mut self.reverse_start),
        };
        *best = Some(best.map_or(quality, |q| q.max(quality)));
        match *first_start {
            Some(seen) => self.independent |= seen != start,
            None => *first_start = Some(start),
        }
    }

    fn quality(&self) -> u8 {
        let mut total = u32::from(self.best_forward.unwrap_or(0)) + u32::from(self.best_reverse.unwrap_or(0));
        if self.independent {
            total += SAME_STRAND_BONUS;
        }
        u8::try_from(total.min(u32::from(MAX_CONSENSUS_QUALITY))).unwrap_or(MAX_CONSENSUS_QUALITY)
    }
}
