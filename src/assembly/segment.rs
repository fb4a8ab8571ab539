//! Base segments: which read supplies the consensus at each column.
//!
//! `BS` records tile the gapped consensus with runs where a single read
//! agrees with it base for base.

use serde::{Deserialize, Serialize};

use crate::assembly::builder::BuildError;
use crate::core::read::AssembledRead;
use crate::core::sequence::GappedSequence;
use crate::core::types::{to_i64, Range};

/// A run of consensus columns taken from one read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSegment {
    pub read_id: String,
    /// 0-based gapped consensus range
    pub range: Range,
}

/// Tile `consensus` with base segments.
///
/// Reads covering the cursor are kept ordered by where they end; the first
/// one agreeing with the consensus is extended as far as it keeps agreeing.
///
/// # Errors
///
/// Returns `BuildError::NoMatchingRead` for the first column that no
/// covering read agrees with, including columns without coverage.
pub fn compute_base_segments(
    consensus: &GappedSequence,
    reads: &[AssembledRead],
) -> Result<Vec<BaseSegment>, BuildError> {
    let mut by_start: Vec<&AssembledRead> = reads.iter().filter(|r| r.has_bases()).collect();
    by_start.sort_by_key(|r| r.offset());

    let bases = consensus.as_bytes();
    let length = to_i64(bases.len());
    let agrees = |read: &AssembledRead, column: i64| {
        let expected = usize::try_from(column).ok().and_then(|c| bases.get(c));
        matches!((read.base_at(column), expected), (Some(b), Some(e)) if b.eq_ignore_ascii_case(e))
    };

    let mut segments = Vec::new();
    let mut active: Vec<&AssembledRead> = Vec::new();
    let mut next_read = 0;
    let mut cursor = 0i64;

    while cursor < length {
        while next_read < by_start.len() && by_start[next_read].offset() <= cursor {
            let read = by_start[next_read];
            let at = active.partition_point(|r| r.end() <= read.end());
            active.insert(at, read);
            next_read += 1;
        }
        active.retain(|r| r.end() >= cursor);

        let Some(read) = active.iter().copied().find(|r| agrees(r, cursor)) else {
            return Err(BuildError::NoMatchingRead { offset: cursor });
        };

        let mut end = cursor;
        while end + 1 < length && agrees(read, end + 1) {
            end += 1;
        }
        segments.push(BaseSegment {
            read_id: read.id().to_string(),
            range: Range::new(cursor, end),
        });
        cursor = end + 1;
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::read::TraceInfo;
    use crate::core::types::Direction;

    fn read(id: &str, bases: &str, offset: i64) -> AssembledRead {
        let seq = GappedSequence::new(bases);
        let len = seq.ungapped_len();
        AssembledRead::new(
            id.to_string(),
            seq,
            offset,
            Direction::Forward,
            Range::of_length(0, len),
            len,
            TraceInfo::for_read(id),
        )
    }

    #[test]
    fn test_single_exact_read() {
        let consensus = GappedSequence::new("ACGT");
        let segments = compute_base_segments(&consensus, &[read("r1", "ACGT", 0)]).unwrap();
        assert_eq!(
            segments,
            vec![BaseSegment {
                read_id: "r1".to_string(),
                range: Range::new(0, 3),
            }]
        );
    }

    #[test]
    fn test_switches_read_at_mismatch() {
        let consensus = GappedSequence::new("ACGTAC");
        let reads = vec![read("r1", "ACGAAC", 0), read("r2", "CGTAC", 1)];
        let segments = compute_base_segments(&consensus, &reads).unwrap();
        let tiles: Vec<(&str, Range)> = segments.iter().map(|s| (s.read_id.as_str(), s.range)).collect();
        assert_eq!(tiles, vec![("r1", Range::new(0, 2)), ("r2", Range::new(3, 5))]);
    }

    #[test]
    fn test_prefers_read_ending_first() {
        let consensus = GappedSequence::new("ACGTAC");
        let reads = vec![read("long", "ACGTAC", 0), read("short", "ACG", 0)];
        let segments = compute_base_segments(&consensus, &reads).unwrap();
        assert_eq!(segments[0].read_id, "short");
        assert_eq!(segments[0].range, Range::new(0, 2));
        assert_eq!(segments[1].read_id, "long");
        assert_eq!(segments[1].range, Range::new(3, 5));
    }

    #[test]
    fn test_no_matching_read_is_an_error() {
        let consensus = GappedSequence::new("ACGT");
        let err = compute_base_segments(&consensus, &[read("r1", "ACCT", 0)]).unwrap_err();
        assert!(matches!(err, BuildError::NoMatchingRead { offset: 2 }));

        let err = compute_base_segments(&consensus, &[read("r1", "AC", 0)]).unwrap_err();
        assert!(matches!(err, BuildError::NoMatchingRead { offset: 2 }));
    }
}
