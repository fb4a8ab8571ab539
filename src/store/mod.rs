//! Contig stores over the parse engine.
//!
//! Three strategies trade memory for lookup latency:
//!
//! | Strategy | Holds | `get` cost |
//! |----------|-------|-----------|
//! | [`InMemoryStore`] | every built contig | hash lookup |
//! | [`IndexedStore`] | one memento per contig | re-parse of one contig |
//! | [`StreamingStore`] | nothing | full pass |
//!
//! Stores are created with [`StoreBuilder`]:
//!
//! ```rust,no_run
//! use ace_assembly::store::{StoreBuilder, StoreHint};
//!
//! let store = StoreBuilder::new(StoreHint::Indexed)
//!     .with_filter(|id| id.starts_with("Contig"))
//!     .build_from_path("assembly.ace")
//!     .unwrap();
//! for contig in store.iter().unwrap() {
//!     let contig = contig.unwrap();
//!     println!("{} {}", contig.id(), contig.num_reads());
//! }
//! ```

pub mod indexed;
pub mod memory;
pub mod streaming;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use indexed::IndexedStore;
pub use memory::InMemoryStore;
pub use streaming::StreamingStore;

use crate::assembly::consensus::ConsensusRecall;
use crate::core::contig::Contig;
use crate::core::lookup::SharedQualities;
use crate::core::tag::{ConsensusTag, ConsensusTagHeader, ReadTag, TagSet, WholeAssemblyTag};
use crate::parsing::parser::{AceFileParser, ParseError};
use crate::parsing::section::ContigHeader;
use crate::visitor::collect::{
    BuildOptions, ConsensusTagCollector, ContigBuilderVisitor, ContigFilter, InvalidReadError,
};
use crate::visitor::{AceFileVisitor, ConsensusTagVisit, ContigVisit, Memento, ParseCallback, VisitDecision};

/// Default number of built contigs buffered between a streaming worker and
/// its consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store has been closed")]
    Closed,

    #[error("Contig {0} is indexed but was not found when re-parsing")]
    MissingContig(String),

    #[error("Streaming worker terminated unexpectedly")]
    WorkerFailed,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Iterator over the contigs of a store, in file order
pub type ContigIter<'a> = Box<dyn Iterator<Item = Result<Contig, StoreError>> + 'a>;

/// Read access to the contigs and tags of one ACE file.
///
/// Counts and ids only cover contigs accepted by the store's filter.
/// `num_reads` is the sum of the read counts declared by `CO` records.
/// Every method fails with [`StoreError::Closed`] after [`close`](Self::close).
pub trait AceContigStore: Send {
    fn get(&self, id: &str) -> Result<Option<Contig>, StoreError>;

    fn contains(&self, id: &str) -> Result<bool, StoreError>;

    fn ids(&self) -> Result<Vec<String>, StoreError>;

    fn num_contigs(&self) -> Result<usize, StoreError>;

    fn num_reads(&self) -> Result<u64, StoreError>;

    fn iter(&self) -> Result<ContigIter<'_>, StoreError>;

    fn whole_assembly_tags(&self) -> Result<Vec<WholeAssemblyTag>, StoreError>;

    fn consensus_tags(&self) -> Result<Vec<ConsensusTag>, StoreError>;

    fn read_tags(&self) -> Result<Vec<ReadTag>, StoreError>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// All tags at once
    fn tags(&self) -> Result<TagSet, StoreError> {
        Ok(TagSet {
            whole_assembly: self.whole_assembly_tags()?,
            consensus: self.consensus_tags()?,
            read: self.read_tags()?,
        })
    }
}

/// Which store to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreHint {
    /// Build every contig up front
    #[default]
    InMemory,
    /// Remember where each contig starts and re-parse on lookup
    Indexed,
    /// Keep nothing; every call is a new pass
    Streaming,
}

/// Configures and opens an [`AceContigStore`]
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    hint: StoreHint,
    options: BuildOptions,
    filter: Option<FilterFn>,
    channel_capacity: usize,
}

#[derive(Clone)]
struct FilterFn(ContigFilter);

impl std::fmt::Debug for FilterFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContigFilter")
    }
}

impl StoreBuilder {
    #[must_use]
    pub fn new(hint: StoreHint) -> Self {
        Self {
            hint,
            options: BuildOptions::default(),
            filter: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Only expose contigs whose id passes `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(FilterFn(Arc::new(filter)));
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_recall(mut self, recall: ConsensusRecall) -> Self {
        self.options = self.options.with_recall(recall);
        self
    }

    #[must_use]
    pub fn with_recomputed_quality(mut self, qualities: SharedQualities) -> Self {
        self.options = self.options.with_recomputed_quality(qualities);
        self
    }

    #[must_use]
    pub fn with_invalid_read_handler(
        mut self,
        handler: impl Fn(&InvalidReadError) + Send + Sync + 'static,
    ) -> Self {
        self.options = self.options.with_invalid_read_handler(handler);
        self
    }

    /// Buffer size of the streaming worker's channel; at least 1
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Open a store over a file
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Parse` when the file cannot be opened or the
    /// initial pass fails.
    pub fn build_from_path(self, path: impl AsRef<Path>) -> Result<Box<dyn AceContigStore>, StoreError> {
        let parser = AceFileParser::from_path(path)?;
        self.build(parser)
    }

    /// Open a store over a parser
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Parse` when the initial pass fails, or
    /// `ParseError::NotSeekable` for an indexed store over a source
    /// without random access.
    pub fn build(self, parser: AceFileParser) -> Result<Box<dyn AceContigStore>, StoreError> {
        let filter = self.filter.map(|f| f.0);
        Ok(match self.hint {
            StoreHint::InMemory => Box::new(InMemoryStore::open(&parser, self.options, filter)?),
            StoreHint::Indexed => Box::new(IndexedStore::open(parser, self.options, filter)?),
            StoreHint::Streaming => Box::new(StreamingStore::new(
                parser,
                self.options,
                filter,
                self.channel_capacity,
            )),
        })
    }
}

fn accepts(filter: Option<&ContigFilter>, id: &str) -> bool {
    filter.map_or(true, |f| f(id))
}

/// Where a contig lives and how many reads it declares
#[derive(Debug, Clone)]
struct IndexEntry {
    id: String,
    num_reads: usize,
    memento: Option<Memento>,
}

/// File visitor recording contig headers and collecting tags, without
/// building any contig
struct AssemblyIndex {
    filter: Option<ContigFilter>,
    with_mementos: bool,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    tags: TagSet,
}

impl AssemblyIndex {
    fn new(filter: Option<ContigFilter>, with_mementos: bool) -> Self {
        Self {
            filter,
            with_mementos,
            entries: Vec::new(),
            positions: HashMap::new(),
            tags: TagSet::default(),
        }
    }

    fn scan(parser: &AceFileParser, filter: Option<ContigFilter>, with_mementos: bool) -> Result<Self, ParseError> {
        let mut index = Self::new(filter, with_mementos);
        parser.accept(&mut index)?;
        Ok(index)
    }

    fn entry(&self, id: &str) -> Option<&IndexEntry> {
        self.positions.get(id).map(|&i| &self.entries[i])
    }

    fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    fn num_reads(&self) -> u64 {
        self.entries.iter().map(|e| e.num_reads as u64).sum()
    }
}

impl AceFileVisitor for AssemblyIndex {
    fn visit_contig(
        &mut self,
        callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        if accepts(self.filter.as_ref(), &header.id) {
            let memento = if self.with_mementos {
                Some(callback.create_memento()?)
            } else {
                None
            };
            self.positions.insert(header.id.clone(), self.entries.len());
            self.entries.push(IndexEntry {
                id: header.id.clone(),
                num_reads: header.num_reads,
                memento,
            });
        }
        Ok(VisitDecision::Skip)
    }

    fn visit_read_tag(&mut self, _callback: &ParseCallback, tag: ReadTag) -> Result<(), ParseError> {
        self.tags.read.push(tag);
        Ok(())
    }

    fn visit_consensus_tag(
        &mut self,
        _callback: &ParseCallback,
        header: &ConsensusTagHeader,
    ) -> Result<ConsensusTagVisit<'_>, ParseError> {
        Ok(VisitDecision::Visit(Box::new(ConsensusTagCollector::new(
            header,
            &mut self.tags.consensus,
        ))))
    }

    fn visit_whole_assembly_tag(
        &mut self,
        _callback: &ParseCallback,
        tag: WholeAssemblyTag,
    ) -> Result<(), ParseError> {
        self.tags.whole_assembly.push(tag);
        Ok(())
    }
}

/// Builds the first contig with a matching id and halts the pass
struct SingleContig<'a> {
    id: &'a str,
    options: &'a BuildOptions,
    found: Option<Contig>,
}

impl<'a> SingleContig<'a> {
    fn new(id: &'a str, options: &'a BuildOptions) -> Self {
        Self {
            id,
            options,
            found: None,
        }
    }
}

impl AceFileVisitor for SingleContig<'_> {
    fn visit_contig(
        &mut self,
        callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        if header.id != self.id {
            return Ok(VisitDecision::Skip);
        }
        let found = &mut self.found;
        let callback = callback.clone();
        Ok(VisitDecision::Visit(Box::new(
            ContigBuilderVisitor::new(header, self.options, move |contig| {
                *found = Some(contig);
                callback.halt();
                Ok(())
            }),
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    /// Three contigs, one consensus tag and one whole-assembly tag
    pub const THREE_CONTIGS: &str = "AS 3 4

CO ctg1 4 1 1 U
ACGT

BQ
 40 40 40 40

AF r1 U 1
BS 1 4 r1

RD r1 4 0 0
ACGT

QA 1 4 1 4
DS CHROMAT_FILE: r1 PHD_FILE: r1.phd.1 TIME: Thu Sep 23 10:48:44 2004

CO ctg2 5 2 2 U
AC*GT

BQ
 30 30 30 30

AF r2 U 1
AF r3 C 3
BS 1 2 r2
BS 3 5 r3

RD r2 3 0 0
AC*

QA 1 3 1 3
DS CHROMAT_FILE: r2 PHD_FILE: r2.phd.1 TIME: Thu Sep 23 10:48:44 2004

RD r3 3 0 0
*GT

QA 1 3 1 3
DS CHROMAT_FILE: r3 PHD_FILE: r3.phd.1 TIME: Thu Sep 23 10:48:44 2004

CO other 3 1 1 U
TTT

BQ
 20 20 20

AF r4 U 1
BS 1 3 r4

RD r4 3 0 0
TTT

QA 1 3 1 3
DS CHROMAT_FILE: r4 PHD_FILE: r4.phd.1 TIME: Thu Sep 23 10:48:44 2004

CT{
ctg2 comment consed 1 2 040923:104844
a note
}

WA{
phrap_params phrap 040923:104844
phrap standard.fasta.screen -new_ace
}
";

    pub fn write_ace(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("three.ace");
        std::fs::write(&path, THREE_CONTIGS).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::test_data::write_ace;
    use super::*;

    fn open_all(path: &Path) -> Vec<Box<dyn AceContigStore>> {
        [StoreHint::InMemory, StoreHint::Indexed, StoreHint::Streaming]
            .into_iter()
            .map(|hint| StoreBuilder::new(hint).build_from_path(path).unwrap())
            .collect()
    }

    #[test]
    fn test_strategies_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ace(&dir);
        let stores = open_all(&path);
        let expected: Vec<Contig> = stores[0].iter().unwrap().map(Result::unwrap).collect();
        assert_eq!(expected.len(), 3);

        for store in &stores {
            assert_eq!(store.num_contigs().unwrap(), 3);
            assert_eq!(store.num_reads().unwrap(), 4);
            assert_eq!(store.ids().unwrap(), vec!["ctg1", "ctg2", "other"]);
            let contigs: Vec<Contig> = store.iter().unwrap().map(Result::unwrap).collect();
            assert_eq!(contigs, expected);
            assert_eq!(store.get("ctg2").unwrap().as_ref(), Some(&expected[1]));
            assert!(store.get("missing").unwrap().is_none());
            assert!(store.contains("other").unwrap());
            assert_eq!(store.consensus_tags().unwrap().len(), 1);
            assert_eq!(store.whole_assembly_tags().unwrap().len(), 1);
            assert!(store.read_tags().unwrap().is_empty());
        }
    }

    #[test]
    fn test_filter_applies_to_every_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ace(&dir);
        for hint in [StoreHint::InMemory, StoreHint::Indexed, StoreHint::Streaming] {
            let store = StoreBuilder::new(hint)
                .with_filter(|id| id.starts_with("ctg"))
                .build_from_path(&path)
                .unwrap();
            assert_eq!(store.ids().unwrap(), vec!["ctg1", "ctg2"], "{hint:?}");
            assert_eq!(store.num_reads().unwrap(), 3);
            assert!(!store.contains("other").unwrap());
            assert!(store.get("other").unwrap().is_none());
        }
    }

    #[test]
    fn test_closed_store_rejects_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ace(&dir);
        for mut store in open_all(&path) {
            store.close();
            assert!(store.is_closed());
            assert!(matches!(store.get("ctg1"), Err(StoreError::Closed)));
            assert!(matches!(store.num_contigs(), Err(StoreError::Closed)));
            assert!(matches!(store.iter().err(), Some(StoreError::Closed)));
            assert!(matches!(store.tags(), Err(StoreError::Closed)));
        }
    }

    #[test]
    fn test_indexed_store_requires_seekable_source() {
        let parser = AceFileParser::from_reader(std::io::Cursor::new(
            super::test_data::THREE_CONTIGS.to_string(),
        ));
        let result = StoreBuilder::new(StoreHint::Indexed).build(parser);
        assert!(matches!(
            result.err(),
            Some(StoreError::Parse(ParseError::NotSeekable(_)))
        ));
    }

    #[test]
    fn test_store_hint_serde() {
        assert_eq!(serde_json::to_string(&StoreHint::InMemory).unwrap(), "\"in_memory\"");
        let hint: StoreHint = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(hint, StoreHint::Streaming);
    }
}
