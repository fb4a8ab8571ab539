//! Store keeping one memento per contig and re-parsing on lookup.

use tracing::{debug, trace};

use super::{AceContigStore, AssemblyIndex, ContigIter, SingleContig, StoreError};
use crate::core::contig::Contig;
use crate::core::tag::{ConsensusTag, ReadTag, WholeAssemblyTag};
use crate::parsing::parser::{AceFileParser, ParseError};
use crate::visitor::collect::{BuildOptions, ContigFilter};

/// Lazy store over a seekable file.
///
/// Opening runs one pass that skips every contig body and records where
/// each contig starts. `get` resumes a new pass at that position and halts
/// once the contig is built, so lookups cost one contig of parsing.
pub struct IndexedStore {
    parser: AceFileParser,
    options: BuildOptions,
    index: AssemblyIndex,
    closed: bool,
}

impl std::fmt::Debug for IndexedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStore")
            .field("parser", &self.parser)
            .field("contigs", &self.index.entries.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl IndexedStore {
    /// Index a seekable source
    ///
    /// # Errors
    ///
    /// Returns `ParseError::NotSeekable` for gzip or stream sources and any
    /// error raised by the indexing pass.
    pub fn open(
        parser: AceFileParser,
        options: BuildOptions,
        filter: Option<ContigFilter>,
    ) -> Result<Self, StoreError> {
        if !parser.is_seekable() {
            return Err(ParseError::NotSeekable(format!("{parser:?} cannot be indexed")).into());
        }
        let index = AssemblyIndex::scan(&parser, filter, true)?;
        debug!(contigs = index.entries.len(), "Indexed ACE contigs");
        Ok(Self {
            parser,
            options,
            index,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn load(&self, id: &str) -> Result<Option<Contig>, StoreError> {
        let Some(entry) = self.index.entry(id) else {
            return Ok(None);
        };
        let Some(memento) = &entry.memento else {
            return Err(StoreError::MissingContig(id.to_string()));
        };
        trace!(contig = id, "Re-parsing indexed contig");
        let mut visitor = SingleContig::new(id, &self.options);
        self.parser.accept_from(memento, &mut visitor)?;
        visitor
            .found
            .map(Some)
            .ok_or_else(|| StoreError::MissingContig(id.to_string()))
    }
}

impl AceContigStore for IndexedStore {
    fn get(&self, id: &str) -> Result<Option<Contig>, StoreError> {
        self.check_open()?;
        self.load(id)
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.index.entry(id).is_some())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.check_open()?;
        Ok(self.index.ids())
    }

    fn num_contigs(&self) -> Result<usize, StoreError> {
        self.check_open()?;
        Ok(self.index.entries.len())
    }

    fn num_reads(&self) -> Result<u64, StoreError> {
        self.check_open()?;
        Ok(self.index.num_reads())
    }

    fn iter(&self) -> Result<ContigIter<'_>, StoreError> {
        self.check_open()?;
        Ok(Box::new(self.index.entries.iter().map(move |entry| {
            self.load(&entry.id)?
                .ok_or_else(|| StoreError::MissingContig(entry.id.clone()))
        })))
    }

    fn whole_assembly_tags(&self) -> Result<Vec<WholeAssemblyTag>, StoreError> {
        self.check_open()?;
        Ok(self.index.tags.whole_assembly.clone())
    }

    fn consensus_tags(&self) -> Result<Vec<ConsensusTag>, StoreError> {
        self.check_open()?;
        Ok(self.index.tags.consensus.clone())
    }

    fn read_tags(&self) -> Result<Vec<ReadTag>, StoreError> {
        self.check_open()?;
        Ok(self.index.tags.read.clone())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
