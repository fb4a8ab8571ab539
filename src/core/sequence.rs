use serde::{Deserialize, Serialize};

use crate::core::types::{to_i64, Range, GAP};

/// A nucleotide sequence that may contain `*` alignment pads.
///
/// Bases are stored uppercase; `-` pads are normalized to `*` on input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GappedSequence {
    bases: Vec<u8>,
}

impl GappedSequence {
    #[must_use]
    pub fn new(bases: impl AsRef<[u8]>) -> Self {
        let bases = bases
            .as_ref()
            .iter()
            .map(|&b| if b == b'-' { GAP } else { b.to_ascii_uppercase() })
            .collect();
        Self { bases }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bases
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bases
    }

    /// Gapped length
    #[must_use]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    #[must_use]
    pub fn get(&self, offset: usize) -> Option<u8> {
        self.bases.get(offset).copied()
    }

    #[must_use]
    pub fn is_gap(&self, offset: usize) -> bool {
        self.bases.get(offset) == Some(&GAP)
    }

    #[must_use]
    pub fn ungapped_len(&self) -> usize {
        self.bases.iter().filter(|&&b| b != GAP).count()
    }

    #[must_use]
    pub fn num_gaps(&self) -> usize {
        self.len() - self.ungapped_len()
    }

    /// Bases with all pads removed
    #[must_use]
    pub fn ungapped(&self) -> Vec<u8> {
        self.bases.iter().copied().filter(|&b| b != GAP).collect()
    }

    /// Gapped offsets of every pad, ascending
    #[must_use]
    pub fn gap_offsets(&self) -> Vec<usize> {
        self.bases
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == GAP)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of non-pad bases before `gapped_offset`.
    ///
    /// For a pad this is the ungapped offset of the next real base.
    #[must_use]
    pub fn ungapped_offset(&self, gapped_offset: usize) -> usize {
        let end = gapped_offset.min(self.bases.len());
        self.bases[..end].iter().filter(|&&b| b != GAP).count()
    }

    /// Gapped offset of the `ungapped_offset`-th real base
    #[must_use]
    pub fn gapped_offset(&self, ungapped_offset: usize) -> Option<usize> {
        self.bases
            .iter()
            .enumerate()
            .filter(|(_, &b)| b != GAP)
            .nth(ungapped_offset)
            .map(|(i, _)| i)
    }

    /// Sub-sequence for an inclusive gapped range, clipped to the sequence
    #[must_use]
    pub fn slice(&self, range: &Range) -> GappedSequence {
        let full = Range::of_length(0, self.len());
        match range.intersection(&full) {
            Some(r) => {
                let begin = usize::try_from(r.begin).unwrap_or(0);
                let end = usize::try_from(r.end).unwrap_or(0);
                Self {
                    bases: self.bases[begin..=end].to_vec(),
                }
            }
            None => Self::default(),
        }
    }

    #[must_use]
    pub fn reverse_complement(&self) -> GappedSequence {
        Self {
            bases: reverse_complement(&self.bases),
        }
    }

    /// Gapped range covering the whole sequence starting at `offset`
    #[must_use]
    pub fn range_at(&self, offset: i64) -> Range {
        Range::new(offset, offset + to_i64(self.len()) - 1)
    }
}

impl std::fmt::Display for GappedSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bases))
    }
}

impl From<&str> for GappedSequence {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Complement a single IUPAC base, preserving case and pads
#[must_use]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        b'r' => b'y',
        b'y' => b'r',
        b'k' => b'm',
        b'm' => b'k',
        b'b' => b'v',
        b'v' => b'b',
        b'd' => b'h',
        b'h' => b'd',
        other => other,
    }
}

#[must_use]
pub fn reverse_complement(bases: &[u8]) -> Vec<u8> {
    bases.iter().rev().map(|&b| complement(b)).collect()
}
