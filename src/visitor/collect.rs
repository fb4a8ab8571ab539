//! Visitors that turn parse events into [`Contig`]s and tags.
//!
//! [`ContigBuilderVisitor`] gathers one contig's records into a
//! [`ContigBuilder`] and hands the built contig to a sink.
//! [`AssemblyCollector`] keeps every contig and tag of a file in memory.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::assembly::builder::{ContigBuilder, ReadBuilder};
use crate::assembly::consensus::ConsensusRecall;
use crate::core::contig::Contig;
use crate::core::lookup::SharedQualities;
use crate::core::read::TraceInfo;
use crate::core::sequence::GappedSequence;
use crate::core::tag::{ConsensusTag, ConsensusTagHeader, ReadTag, TagSet, WholeAssemblyTag};
use crate::core::types::{to_i64, Direction, Range};
use crate::parsing::parser::ParseError;
use crate::parsing::section::{ContigHeader, FileHeader, QualityClip, ReadHeader, TraceDescription};
use crate::visitor::{
    AceConsensusTagVisitor, AceContigVisitor, AceFileVisitor, AceReadVisitor, ConsensusTagVisit,
    ContigVisit, ParseCallback, ReadVisit, VisitDecision,
};

/// A read whose `QA` record leaves no usable bases. The read is dropped
/// and parsing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Read {read_id} in contig {contig_id} has no valid bases (QA {} {} {} {})",
    clip.qual_left, clip.qual_right, clip.align_left, clip.align_right
)]
pub struct InvalidReadError {
    pub contig_id: String,
    pub read_id: String,
    pub clip: QualityClip,
}

pub type InvalidReadHandler = Arc<dyn Fn(&InvalidReadError) + Send + Sync>;

/// Selects contigs by id
pub type ContigFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// How contigs are built from parsed records
#[derive(Clone, Default)]
pub struct BuildOptions {
    recall: Option<ConsensusRecall>,
    recompute_quality: Option<SharedQualities>,
    placeholder_quality: Option<u8>,
    invalid_read_handler: Option<InvalidReadHandler>,
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("recall", &self.recall)
            .field("recompute_quality", &self.recompute_quality.is_some())
            .field("placeholder_quality", &self.placeholder_quality)
            .field("invalid_read_handler", &self.invalid_read_handler.is_some())
            .finish()
    }
}

impl BuildOptions {
    #[must_use]
    pub fn with_recall(mut self, recall: ConsensusRecall) -> Self {
        self.recall = Some(recall);
        self
    }

    /// Ignore `BQ` values and recompute consensus qualities from reads
    #[must_use]
    pub fn with_recomputed_quality(mut self, qualities: SharedQualities) -> Self {
        self.recompute_quality = Some(qualities);
        self
    }

    /// Quality for contigs with neither `BQ` values nor recomputation
    #[must_use]
    pub fn with_placeholder_quality(mut self, quality: u8) -> Self {
        self.placeholder_quality = Some(quality);
        self
    }

    #[must_use]
    pub fn with_invalid_read_handler(
        mut self,
        handler: impl Fn(&InvalidReadError) + Send + Sync + 'static,
    ) -> Self {
        self.invalid_read_handler = Some(Arc::new(handler));
        self
    }

    /// Notify the handler, or log a warning without one
    pub fn report_invalid_read(&self, error: &InvalidReadError) {
        match &self.invalid_read_handler {
            Some(handler) => handler(error),
            None => warn!("{error}"),
        }
    }

    fn configure(&self, builder: &mut ContigBuilder, qualities: Option<Vec<u8>>) {
        if let Some(recall) = &self.recall {
            builder.recall_consensus(recall.clone());
        }
        if let Some(quality) = self.placeholder_quality {
            builder.set_placeholder_quality(quality);
        }
        match (&self.recompute_quality, qualities) {
            (Some(lookup), _) => {
                builder.compute_consensus_quality(Arc::clone(lookup));
            }
            (None, Some(qualities)) => {
                builder.set_consensus_quality(qualities);
            }
            (None, None) => {}
        }
    }
}

type ContigSink<'a> = Box<dyn FnMut(Contig) -> Result<(), ParseError> + 'a>;

/// Contig visitor that builds a [`Contig`] from the records of one contig
pub struct ContigBuilderVisitor<'a> {
    header: ContigHeader,
    options: &'a BuildOptions,
    consensus: Vec<u8>,
    qualities: Option<Vec<u8>>,
    placements: HashMap<String, (Direction, i64)>,
    reads: Vec<ReadBuilder>,
    sink: ContigSink<'a>,
}

impl<'a> ContigBuilderVisitor<'a> {
    pub fn new(
        header: &ContigHeader,
        options: &'a BuildOptions,
        sink: impl FnMut(Contig) -> Result<(), ParseError> + 'a,
    ) -> Self {
        Self {
            header: header.clone(),
            options,
            consensus: Vec::with_capacity(header.num_bases),
            qualities: None,
            placements: HashMap::with_capacity(header.num_reads),
            reads: Vec::with_capacity(header.num_reads),
            sink: Box::new(sink),
        }
    }

    fn finish_read(&mut self, record: ReadRecord) -> Result<(), ParseError> {
        let read_id = record.header.read_id;
        let Some(&(direction, start)) = self.placements.get(&read_id) else {
            return Err(ParseError::MissingPlacement(read_id));
        };

        let full = GappedSequence::new(&record.bases);
        if full.len() != record.header.gapped_length {
            warn!(
                contig = %self.header.id,
                read = %read_id,
                declared = record.header.gapped_length,
                found = full.len(),
                "RD length does not match basecalls"
            );
        }

        let clip = record.clip.unwrap_or_else(|| QualityClip::full(full.len()));
        let clear = clip
            .clear_range()
            .and_then(|range| range.intersection(&Range::of_length(0, full.len())))
            .filter(|range| full.slice(range).ungapped_len() > 0);
        let Some(clear) = clear else {
            self.options.report_invalid_read(&InvalidReadError {
                contig_id: self.header.id.clone(),
                read_id,
                clip,
            });
            return Ok(());
        };

        let bases = full.slice(&clear);
        let full_length = full.ungapped_len();
        let first = full.ungapped_offset(usize::try_from(clear.begin).unwrap_or(0));
        let forward = Range::of_length(to_i64(first), bases.ungapped_len());
        let valid_range = match direction {
            Direction::Forward => forward,
            Direction::Reverse => {
                let last = to_i64(full_length) - 1;
                Range::new(last - forward.end, last - forward.begin)
            }
        };

        let trace = match record.trace {
            Some(description) => trace_info(&read_id, description),
            None => TraceInfo::for_read(&read_id),
        };
        self.reads.push(
            ReadBuilder::new(read_id, bases, start + clear.begin, direction)
                .with_valid_range(valid_range, full_length)
                .with_trace(trace),
        );
        Ok(())
    }
}

fn trace_info(read_id: &str, description: TraceDescription) -> TraceInfo {
    let fallback = TraceInfo::for_read(read_id);
    TraceInfo {
        chromat_file: description.chromat_file.unwrap_or(fallback.chromat_file),
        phd_file: description.phd_file.unwrap_or(fallback.phd_file),
        timestamp: description.timestamp,
    }
}

impl AceContigVisitor for ContigBuilderVisitor<'_> {
    fn visit_bases_line(&mut self, bases: &str) -> Result<(), ParseError> {
        self.consensus.extend_from_slice(bases.as_bytes());
        Ok(())
    }

    fn visit_consensus_qualities(&mut self, qualities: &[u8]) -> Result<(), ParseError> {
        self.qualities = Some(qualities.to_vec());
        Ok(())
    }

    fn visit_aligned_read_info(
        &mut self,
        read_id: &str,
        direction: Direction,
        gapped_start: i64,
    ) -> Result<(), ParseError> {
        self.placements
            .insert(read_id.to_string(), (direction, gapped_start));
        Ok(())
    }

    fn visit_begin_read(&mut self, header: &ReadHeader) -> Result<ReadVisit<'_>, ParseError> {
        Ok(VisitDecision::Visit(Box::new(ReadRecordVisitor {
            record: ReadRecord {
                header: header.clone(),
                bases: Vec::with_capacity(header.gapped_length),
                clip: None,
                trace: None,
            },
            contig: self,
        })))
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        let consensus = GappedSequence::new(std::mem::take(&mut self.consensus));
        if consensus.len() != self.header.num_bases {
            warn!(
                contig = %self.header.id,
                declared = self.header.num_bases,
                found = consensus.len(),
                "CO length does not match consensus basecalls"
            );
        }

        let mut builder = ContigBuilder::new(self.header.id.clone(), consensus);
        builder.set_complemented(self.header.complemented);
        self.options.configure(&mut builder, self.qualities.take());
        for read in self.reads.drain(..) {
            builder.add_read(read)?;
        }
        let contig = builder.build()?;
        (self.sink)(contig)
    }
}

struct ReadRecord {
    header: ReadHeader,
    bases: Vec<u8>,
    clip: Option<QualityClip>,
    trace: Option<TraceDescription>,
}

struct ReadRecordVisitor<'b, 'a> {
    record: ReadRecord,
    contig: &'b mut ContigBuilderVisitor<'a>,
}

impl AceReadVisitor for ReadRecordVisitor<'_, '_> {
    fn visit_quality_line(&mut self, clip: QualityClip) -> Result<(), ParseError> {
        self.record.clip = Some(clip);
        Ok(())
    }

    fn visit_trace_description(&mut self, description: &TraceDescription) -> Result<(), ParseError> {
        self.record.trace = Some(description.clone());
        Ok(())
    }

    fn visit_bases_line(&mut self, bases: &str) -> Result<(), ParseError> {
        self.record.bases.extend_from_slice(bases.as_bytes());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        let record = ReadRecord {
            header: self.record.header.clone(),
            bases: std::mem::take(&mut self.record.bases),
            clip: self.record.clip.take(),
            trace: self.record.trace.take(),
        };
        self.contig.finish_read(record)
    }
}

/// Collects one `CT{}` block into a [`ConsensusTag`]
pub struct ConsensusTagCollector<'a> {
    tag: ConsensusTag,
    into: &'a mut Vec<ConsensusTag>,
}

impl<'a> ConsensusTagCollector<'a> {
    pub fn new(header: &ConsensusTagHeader, into: &'a mut Vec<ConsensusTag>) -> Self {
        Self {
            tag: ConsensusTag::from_header(header.clone()),
            into,
        }
    }
}

impl AceConsensusTagVisitor for ConsensusTagCollector<'_> {
    fn visit_data(&mut self, line: &str) -> Result<(), ParseError> {
        self.tag.data.push(line.to_string());
        Ok(())
    }

    fn visit_comment(&mut self, comment: &str) -> Result<(), ParseError> {
        self.tag.comments.push(comment.to_string());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        let tag = ConsensusTag::from_header(self.tag.header());
        self.into.push(std::mem::replace(&mut self.tag, tag));
        Ok(())
    }
}

/// File visitor keeping every contig and tag in memory
#[derive(Default)]
pub struct AssemblyCollector {
    options: BuildOptions,
    filter: Option<ContigFilter>,
    header: Option<FileHeader>,
    contigs: Vec<Contig>,
    tags: TagSet,
    complete: bool,
}

impl AssemblyCollector {
    #[must_use]
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Only build contigs whose id passes `filter`; tags are always kept
    #[must_use]
    pub fn with_filter(mut self, filter: ContigFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    #[must_use]
    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    #[must_use]
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// True once the whole input was read
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<Contig>, TagSet) {
        (self.contigs, self.tags)
    }
}

impl AceFileVisitor for AssemblyCollector {
    fn visit_header(&mut self, header: &FileHeader) -> Result<(), ParseError> {
        self.header = Some(*header);
        Ok(())
    }

    fn visit_contig(
        &mut self,
        _callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        if let Some(filter) = &self.filter {
            if !filter(&header.id) {
                return Ok(VisitDecision::Skip);
            }
        }
        let contigs = &mut self.contigs;
        Ok(VisitDecision::Visit(Box::new(ContigBuilderVisitor::new(
            header,
            &self.options,
            move |contig| {
                contigs.push(contig);
                Ok(())
            },
        ))))
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

    fn visit_end(&mut self) -> Result<(), ParseError> {
        self.complete = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parser::AceFileParser;
    use std::io::Cursor;
    use std::sync::Mutex;

    const ACE: &str = "AS 1 3

CO ctg1 10 3 0 U
ACGT*ACGTA

BQ
 30 30 30 30 30 30 30 30 30

AF r1 U 1
AF r2 C 3
AF r3 U 1

RD r1 10 0 0
ACGT*ACGTA

QA 1 10 1 10
DS CHROMAT_FILE: r1.scf PHD_FILE: r1.phd.1 TIME: Thu Sep 23 10:48:44 2004

RD r2 8 0 0
ttGT*ACG

QA 3 8 3 8
DS CHROMAT_FILE: r2.scf PHD_FILE: r2.phd.1 TIME: Thu Sep 23 10:48:44 2004

RD r3 4 0 0
ACGT

QA -1 -1 1 4
DS CHROMAT_FILE: r3.scf PHD_FILE: r3.phd.1 TIME: Thu Sep 23 10:48:44 2004

CT{
ctg1 comment consed 1 4 040923:104844 NoTrans
first line
COMMENT{
a comment
C}
}
";

    fn collect(text: &str, options: BuildOptions) -> Result<AssemblyCollector, ParseError> {
        let mut collector = AssemblyCollector::new(options);
        AceFileParser::from_reader(Cursor::new(text.to_string())).accept(&mut collector)?;
        Ok(collector)
    }

    #[test]
    fn test_builds_contig_from_records() {
        let collector = collect(ACE, BuildOptions::default()).unwrap();
        assert!(collector.is_complete());
        let contig = &collector.contigs()[0];
        assert_eq!(contig.id(), "ctg1");
        assert_eq!(contig.consensus().to_string(), "ACGT*ACGTA");
        assert_eq!(contig.consensus_quality().len(), 9);

        let r1 = contig.read("r1").unwrap();
        assert_eq!(r1.offset(), 0);
        assert_eq!(r1.valid_range(), Range::new(0, 8));
        assert_eq!(r1.trace().chromat_file, "r1.scf");
        assert!(r1.trace().timestamp.is_some());
    }

    #[test]
    fn test_clear_range_trims_read() {
        let collector = collect(ACE, BuildOptions::default()).unwrap();
        let r2 = collector.contigs()[0].read("r2").unwrap();
        // QA 3..8 keeps "GT*ACG" starting two columns after AF
        assert_eq!(r2.bases().to_string(), "GT*ACG");
        assert_eq!(r2.offset(), 4);
        assert_eq!(r2.direction(), Direction::Reverse);
        assert_eq!(r2.full_length(), 7);
        // forward ungapped [2, 6] mirrored within a 7 base read
        assert_eq!(r2.valid_range(), Range::new(0, 4));
    }

    #[test]
    fn test_invalid_read_is_reported_and_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = BuildOptions::default().with_invalid_read_handler(move |err| {
            sink.lock().unwrap().push(err.read_id.clone());
        });
        let collector = collect(ACE, options).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["r3".to_string()]);
        assert_eq!(collector.contigs()[0].num_reads(), 2);
    }

    #[test]
    fn test_consensus_tags_are_collected() {
        let collector = collect(ACE, BuildOptions::default()).unwrap();
        let tags = collector.tags();
        assert_eq!(tags.consensus.len(), 1);
        let tag = &tags.consensus[0];
        assert_eq!(tag.range, Range::new(0, 3));
        assert!(tag.transient);
        assert_eq!(tag.data, vec!["first line".to_string()]);
        assert_eq!(tag.comments, vec!["a comment".to_string()]);
    }

    #[test]
    fn test_filter_skips_contigs() {
        let mut collector =
            AssemblyCollector::default().with_filter(Arc::new(|id: &str| id != "ctg1"));
        AceFileParser::from_reader(Cursor::new(ACE.to_string()))
            .accept(&mut collector)
            .unwrap();
        assert!(collector.contigs().is_empty());
        assert_eq!(collector.tags().consensus.len(), 1);
    }

    #[test]
    fn test_recomputed_quality_replaces_bq() {
        let mut table: HashMap<String, Vec<u8>> = HashMap::new();
        table.insert("r1".to_string(), vec![50; 9]);
        table.insert("r2".to_string(), vec![50; 7]);
        let options = BuildOptions::default().with_recomputed_quality(Arc::new(table));
        let collector = collect(ACE, options).unwrap();
        let contig = &collector.contigs()[0];
        assert!(contig.consensus_quality().iter().any(|&q| q != 30));
    }

    #[test]
    fn test_missing_placement_is_fatal() {
        let text = ACE.replace("AF r3 U 1\n", "");
        assert!(matches!(
            collect(&text, BuildOptions::default()),
            Err(ParseError::MissingPlacement(id)) if id == "r3"
        ));
    }
}
