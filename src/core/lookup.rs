//! Lookups into per-read trace data held outside the ACE file.
//!
//! Reads in an ACE file are trimmed to their valid range, so recomputing
//! consensus qualities or writing untrimmed `RD` records needs the full
//! read. Both lookups return data for the whole read in its original
//! (uncomplemented) orientation.

use std::collections::HashMap;
use std::sync::Arc;

/// Read id -> full-length ungapped qualities
pub trait QualityLookup {
    fn qualities(&self, read_id: &str) -> Option<&[u8]>;
}

/// Read id -> full-length ungapped basecalls
pub trait SequenceLookup {
    fn sequence(&self, read_id: &str) -> Option<&[u8]>;
}

/// Thread-safe shared quality lookup, as stored by builders and stores
pub type SharedQualities = Arc<dyn QualityLookup + Send + Sync>;

/// Thread-safe shared sequence lookup
pub type SharedSequences = Arc<dyn SequenceLookup + Send + Sync>;

impl std::fmt::Debug for dyn QualityLookup + Send + Sync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QualityLookup")
    }
}

impl std::fmt::Debug for dyn SequenceLookup + Send + Sync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SequenceLookup")
    }
}

impl QualityLookup for HashMap<String, Vec<u8>> {
    fn qualities(&self, read_id: &str) -> Option<&[u8]> {
        self.get(read_id).map(Vec::as_slice)
    }
}

impl SequenceLookup for HashMap<String, Vec<u8>> {
    fn sequence(&self, read_id: &str) -> Option<&[u8]> {
        self.get(read_id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_lookups() {
        let mut table: HashMap<String, Vec<u8>> = HashMap::new();
        table.insert("r1".to_string(), vec![10, 20]);
        assert_eq!(QualityLookup::qualities(&table, "r1"), Some(&[10u8, 20][..]));
        assert_eq!(SequenceLookup::sequence(&table, "r2"), None);
    }
}
