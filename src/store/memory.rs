//! Store holding every built contig in memory.

use std::collections::HashMap;

use tracing::debug;

use super::{AceContigStore, AssemblyIndex, ContigIter, StoreError};
use crate::core::contig::Contig;
use crate::core::tag::{ConsensusTag, ReadTag, TagSet, WholeAssemblyTag};
use crate::parsing::parser::AceFileParser;
use crate::visitor::collect::{AssemblyCollector, BuildOptions, ContigFilter};
use crate::visitor::fanout::FanoutVisitor;
use crate::visitor::AceFileVisitor;

/// Fully materialized store; the only strategy safe for concurrent lookups
#[derive(Debug)]
pub struct InMemoryStore {
    contigs: Vec<Contig>,
    index: HashMap<String, usize>,
    num_reads: u64,
    tags: TagSet,
    closed: bool,
}

impl InMemoryStore {
    /// Build every contig accepted by `filter` in a single pass
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Parse` if the pass fails.
    pub fn open(
        parser: &AceFileParser,
        options: BuildOptions,
        filter: Option<ContigFilter>,
    ) -> Result<Self, StoreError> {
        let mut collector = AssemblyCollector::new(options);
        if let Some(filter) = &filter {
            collector = collector.with_filter(filter.clone());
        }
        let mut headers = AssemblyIndex::new(filter, false);
        {
            let mut fanout = FanoutVisitor::new(vec![
                &mut collector as &mut dyn AceFileVisitor,
                &mut headers,
            ]);
            parser.accept(&mut fanout)?;
        }

        let (contigs, tags) = collector.into_parts();
        let index = contigs
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id().to_string(), i))
            .collect();
        debug!(contigs = contigs.len(), "Loaded ACE contigs into memory");
        Ok(Self {
            contigs,
            index,
            num_reads: headers.num_reads(),
            tags,
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

    /// Borrow a contig without cloning it
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Closed` after `close`.
    pub fn contig(&self, id: &str) -> Result<Option<&Contig>, StoreError> {
        self.check_open()?;
        Ok(self.index.get(id).map(|&i| &self.contigs[i]))
    }
}

impl AceContigStore for InMemoryStore {
    fn get(&self, id: &str) -> Result<Option<Contig>, StoreError> {
        Ok(self.contig(id)?.cloned())
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.index.contains_key(id))
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.check_open()?;
        Ok(self.contigs.iter().map(|c| c.id().to_string()).collect())
    }

    fn num_contigs(&self) -> Result<usize, StoreError> {
        self.check_open()?;
        Ok(self.contigs.len())
    }

    fn num_reads(&self) -> Result<u64, StoreError> {
        self.check_open()?;
        Ok(self.num_reads)
    }

    fn iter(&self) -> Result<ContigIter<'_>, StoreError> {
        self.check_open()?;
        Ok(Box::new(self.contigs.iter().cloned().map(Ok)))
    }

    fn whole_assembly_tags(&self) -> Result<Vec<WholeAssemblyTag>, StoreError> {
        self.check_open()?;
        Ok(self.tags.whole_assembly.clone())
    }

    fn consensus_tags(&self) -> Result<Vec<ConsensusTag>, StoreError> {
        self.check_open()?;
        Ok(self.tags.consensus.clone())
    }

    fn read_tags(&self) -> Result<Vec<ReadTag>, StoreError> {
        self.check_open()?;
        Ok(self.tags.read.clone())
    }

    fn close(&mut self) {
        self.closed = true;
        self.contigs.clear();
        self.index.clear();
        self.tags = TagSet::default();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
