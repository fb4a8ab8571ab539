//! The ACE parse engine.
//!
//! A pass reads the file line by line and drives an [`AceFileVisitor`].
//! The grammar is context sensitive, so the pass tracks which region it is
//! in:
//!
//! - not in a contig: file header and tag blocks
//! - consensus region: consensus basecalls, `BQ`, `AF` and `BS` records
//! - reads region: `RD` basecalls, `QA` and `DS` records
//!
//! A `CO` line or any tag block closes an open contig; the read count the
//! contig declared is checked at that point.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::assembly::builder::BuildError;
use crate::core::tag::{ReadTag, WholeAssemblyTag};
use crate::parsing::line::{Line, LineSource};
use crate::parsing::section::{
    classify, is_basecall_line, parse_aligned_read, parse_base_segment, parse_consensus_tag_header,
    parse_contig_header, parse_file_header, parse_quality_clip, parse_quality_values,
    parse_read_header, parse_read_tag_header, parse_trace_description,
    parse_whole_assembly_tag_header, ContigHeader, ReadHeader, Section,
};
use crate::visitor::callback::PassState;
use crate::visitor::{
    AceConsensusTagVisitor, AceContigVisitor, AceFileVisitor, AceReadVisitor, Memento,
    ParseCallback, VisitDecision,
};

const READ_BUFFER_SIZE: usize = 64 * 1024;

static NEXT_PARSER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {record} record at line {line}: {message}")]
    Malformed {
        line: u64,
        record: &'static str,
        message: String,
    },

    #[error("Unterminated {block} block starting at line {line}")]
    UnterminatedTag { line: u64, block: &'static str },

    #[error("Contig {contig} declares {expected} reads but {seen} were found")]
    ReadCountMismatch {
        contig: String,
        expected: usize,
        seen: usize,
    },

    #[error("Read {read_id} at line {line} has no {record} record")]
    MissingRecord {
        line: u64,
        read_id: String,
        record: &'static str,
    },

    #[error("Read {0} has no AF placement in its contig")]
    MissingPlacement(String),

    #[error("Memento was created by a different parser")]
    ForeignMemento,

    #[error("Source does not support random access: {0}")]
    NotSeekable(String),

    #[error("Stream source has already been consumed")]
    SourceConsumed,

    #[error("Memento unavailable: {0}")]
    MementoUnavailable(&'static str),

    #[error(transparent)]
    Build(#[from] BuildError),
}

enum AceSource {
    File(PathBuf),
    Gzip(PathBuf),
    Stream(Mutex<Option<Box<dyn BufRead + Send>>>),
}

/// Parser for one ACE source.
///
/// File sources can be parsed any number of times, concurrently, and
/// support mementos. Gzip files can be parsed repeatedly but not resumed.
/// Reader sources allow exactly one pass.
pub struct AceFileParser {
    id: u64,
    source: AceSource,
}

impl std::fmt::Debug for AceFileParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            AceSource::File(path) => format!("file {}", path.display()),
            AceSource::Gzip(path) => format!("gzip {}", path.display()),
            AceSource::Stream(_) => "stream".to_string(),
        };
        f.debug_struct("AceFileParser")
            .field("id", &self.id)
            .field("source", &source)
            .finish()
    }
}

/// Check if the path is a gzipped file
#[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
fn is_gzipped(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    path_str.ends_with(".gz") || path_str.ends_with(".bgz")
}

impl AceFileParser {
    /// Parser over a file; `.gz`/`.bgz` files are decompressed on the fly
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Io` if the path does not exist or is not a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(ParseError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )));
        }

        let source = if is_gzipped(path) {
            AceSource::Gzip(path.to_path_buf())
        } else {
            AceSource::File(path.to_path_buf())
        };
        Ok(Self::with_source(source))
    }

    /// Parser over an arbitrary reader; only one pass is possible
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        let reader: Box<dyn BufRead + Send> =
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader));
        Self::with_source(AceSource::Stream(Mutex::new(Some(reader))))
    }

    fn with_source(source: AceSource) -> Self {
        Self {
            id: NEXT_PARSER_ID.fetch_add(1, Ordering::Relaxed),
            source,
        }
    }

    /// True when mementos can be created and resumed
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        matches!(self.source, AceSource::File(_))
    }

    /// Run a full pass over the source
    ///
    /// # Errors
    ///
    /// Returns the first structural error, I/O error, or visitor error.
    pub fn accept(&self, visitor: &mut dyn AceFileVisitor) -> Result<(), ParseError> {
        self.accept_with_halt(visitor, Arc::new(AtomicBool::new(false)))
    }

    /// Run a full pass whose halt flag is `halt`. Setting the flag from any
    /// thread stops the pass before its next line, exactly like
    /// [`ParseCallback::halt`].
    ///
    /// # Errors
    ///
    /// Returns the first structural error, I/O error, or visitor error.
    pub fn accept_with_halt(
        &self,
        visitor: &mut dyn AceFileVisitor,
        halt: Arc<AtomicBool>,
    ) -> Result<(), ParseError> {
        let reader = self.open()?;
        debug!(parser = self.id, "Starting full ACE pass");
        ParseState::new(reader, 0, self.id, self.is_seekable(), halt).run(visitor, true)
    }

    /// Run a pass starting at a contig captured earlier with a memento.
    /// The file header is not visited.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::ForeignMemento` for a memento from another
    /// parser, `ParseError::NotSeekable` for non-file sources, or any error
    /// raised during the pass.
    pub fn accept_from(
        &self,
        memento: &Memento,
        visitor: &mut dyn AceFileVisitor,
    ) -> Result<(), ParseError> {
        if memento.parser_id() != self.id {
            return Err(ParseError::ForeignMemento);
        }
        let AceSource::File(path) = &self.source else {
            return Err(ParseError::NotSeekable(
                "only uncompressed files can be resumed".to_string(),
            ));
        };

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(memento.offset()))?;
        let reader: Box<dyn BufRead + Send> =
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file));
        debug!(parser = self.id, offset = memento.offset(), "Resuming ACE pass");
        ParseState::new(
            reader,
            memento.offset(),
            self.id,
            true,
            Arc::new(AtomicBool::new(false)),
        )
        .run(visitor, false)
    }

    fn open(&self) -> Result<Box<dyn BufRead + Send>, ParseError> {
        match &self.source {
            AceSource::File(path) => Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                File::open(path)?,
            ))),
            AceSource::Gzip(path) => Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(File::open(path)?),
            ))),
            AceSource::Stream(slot) => slot
                .lock()
                .map_err(|_| ParseError::SourceConsumed)?
                .take()
                .ok_or(ParseError::SourceConsumed),
        }
    }
}

/// How a region ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Closed by a line that belongs to an enclosing region
    Closed,
    Eof,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    NotInContig,
    ConsensusBases,
    Consensus,
    ReadBases,
    Reads,
}

/// Stand-in for a skipped sub-tree; swallows every call
struct Skipped;

impl AceContigVisitor for Skipped {}
impl AceReadVisitor for Skipped {}
impl AceConsensusTagVisitor for Skipped {}

/// State of one pass
struct ParseState<R> {
    lines: LineSource<R>,
    pending: Option<Line>,
    pass: Arc<PassState>,
    halt: Arc<AtomicBool>,
    parser_id: u64,
    seekable: bool,
    region: Region,
    qualities: Option<Vec<u8>>,
    contigs_seen: usize,
}

impl<R: BufRead> ParseState<R> {
    fn new(reader: R, offset: u64, parser_id: u64, seekable: bool, halt: Arc<AtomicBool>) -> Self {
        Self {
            lines: LineSource::new(reader, offset),
            pending: None,
            pass: Arc::new(PassState::default()),
            halt,
            parser_id,
            seekable,
            region: Region::NotInContig,
            qualities: None,
            contigs_seen: 0,
        }
    }

    fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    fn callback(&self, memento: Option<Memento>) -> ParseCallback {
        ParseCallback::new(Arc::clone(&self.pass), Arc::clone(&self.halt), memento)
    }

    fn next_line(&mut self) -> Result<Option<Line>, ParseError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let line = self.lines.next_line()?;
        if line.is_some() {
            self.pass.consume_line();
        }
        Ok(line)
    }

    fn run(&mut self, visitor: &mut dyn AceFileVisitor, visit_header: bool) -> Result<(), ParseError> {
        let mut declared_contigs = None;

        loop {
            if self.is_halted() {
                debug!(contigs = self.contigs_seen, "ACE pass halted");
                visitor.halted();
                return Ok(());
            }
            let Some(line) = self.next_line()? else {
                break;
            };

            let flow = match classify(&line.text) {
                Section::FileHeader => {
                    let header = parse_file_header(&line)?;
                    declared_contigs = Some(header.num_contigs);
                    if visit_header {
                        visitor.visit_header(&header)?;
                    }
                    Flow::Closed
                }
                Section::ContigHeader => self.contig(visitor, &line)?,
                Section::ReadTag => self.read_tag(visitor, &line)?,
                Section::WholeAssemblyTag => self.whole_assembly_tag(visitor, &line)?,
                Section::ConsensusTag => self.consensus_tag(visitor, &line)?,
                Section::Blank => Flow::Closed,
                other => {
                    trace!(line = line.number, section = ?other, "Ignoring line outside a contig");
                    Flow::Closed
                }
            };
            if flow == Flow::Halted {
                debug!(contigs = self.contigs_seen, "ACE pass halted");
                visitor.halted();
                return Ok(());
            }
        }

        if visit_header {
            if let Some(declared) = declared_contigs {
                if declared != self.contigs_seen {
                    warn!(
                        declared,
                        found = self.contigs_seen,
                        "AS header contig count does not match file contents"
                    );
                }
            }
        }
        debug!(contigs = self.contigs_seen, "ACE pass complete");
        visitor.visit_end()
    }

    fn contig(&mut self, visitor: &mut dyn AceFileVisitor, line: &Line) -> Result<Flow, ParseError> {
        let header = parse_contig_header(line)?;
        self.contigs_seen += 1;

        let memento = self
            .seekable
            .then(|| Memento::new(self.parser_id, line.offset));
        let callback = self.callback(memento);
        trace!(contig = %header.id, reads = header.num_reads, "Contig header");

        match visitor.visit_contig(&callback, &header)? {
            VisitDecision::Visit(mut contig_visitor) => self.contig_body(&header, contig_visitor.as_mut()),
            VisitDecision::Skip => self.contig_body(&header, &mut Skipped),
        }
    }

    fn contig_body<'v>(
        &mut self,
        header: &ContigHeader,
        visitor: &mut (dyn AceContigVisitor + 'v),
    ) -> Result<Flow, ParseError> {
        self.region = Region::ConsensusBases;
        self.qualities = None;
        let mut reads_seen = 0usize;

        loop {
            if self.is_halted() {
                visitor.halted();
                return Ok(Flow::Halted);
            }
            let Some(line) = self.next_line()? else {
                self.flush_qualities(visitor)?;
                self.close_contig(header, reads_seen, visitor)?;
                return Ok(Flow::Eof);
            };

            if self.region == Region::ConsensusBases && is_basecall_line(&line.text) {
                visitor.visit_bases_line(line.text.trim())?;
                continue;
            }

            let section = classify(&line.text);
            if !matches!(section, Section::Unrecognized | Section::Blank) {
                self.flush_qualities(visitor)?;
            }

            match section {
                Section::Blank => {
                    if self.region == Region::ConsensusBases {
                        self.region = Region::Consensus;
                    }
                }
                Section::ConsensusQualities => {
                    self.region = Region::Consensus;
                    self.qualities = Some(Vec::with_capacity(header.num_bases));
                }
                Section::Unrecognized => {
                    if let Some(qualities) = self.qualities.as_mut() {
                        parse_quality_values(&line, qualities)?;
                    } else {
                        trace!(line = line.number, "Ignoring unrecognized line in contig");
                    }
                }
                Section::AlignedRead => {
                    let placement = parse_aligned_read(&line)?;
                    visitor.visit_aligned_read_info(
                        &placement.read_id,
                        placement.direction,
                        placement.gapped_start,
                    )?;
                }
                Section::BaseSegment => {
                    let segment = parse_base_segment(&line)?;
                    visitor.visit_base_segment(segment.range, &segment.read_id)?;
                }
                Section::ReadHeader => {
                    let read = parse_read_header(&line)?;
                    let flow = match visitor.visit_begin_read(&read)? {
                        VisitDecision::Visit(mut read_visitor) => {
                            self.read_body(&read, line.number, read_visitor.as_mut())?
                        }
                        VisitDecision::Skip => self.read_body(&read, line.number, &mut Skipped)?,
                    };
                    match flow {
                        Flow::Halted => {
                            visitor.halted();
                            return Ok(Flow::Halted);
                        }
                        Flow::Eof => {
                            self.close_contig(header, reads_seen + 1, visitor)?;
                            return Ok(Flow::Eof);
                        }
                        Flow::Closed => reads_seen += 1,
                    }
                }
                Section::QualityClip | Section::TraceDescription => {
                    return Err(ParseError::Malformed {
                        line: line.number,
                        record: if section == Section::QualityClip { "QA" } else { "DS" },
                        message: "record outside of a read".to_string(),
                    });
                }
                Section::FileHeader
                | Section::ContigHeader
                | Section::ReadTag
                | Section::WholeAssemblyTag
                | Section::ConsensusTag => {
                    self.pending = Some(line);
                    self.close_contig(header, reads_seen, visitor)?;
                    return Ok(Flow::Closed);
                }
            }
        }
    }

    fn read_body<'v>(
        &mut self,
        header: &ReadHeader,
        header_line: u64,
        visitor: &mut (dyn AceReadVisitor + 'v),
    ) -> Result<Flow, ParseError> {
        self.region = Region::ReadBases;
        let mut clip_seen = false;

        loop {
            if self.is_halted() {
                visitor.halted();
                return Ok(Flow::Halted);
            }
            let Some(line) = self.next_line()? else {
                Self::finish_read(header, header_line, clip_seen, visitor)?;
                return Ok(Flow::Eof);
            };

            if self.region == Region::ReadBases && is_basecall_line(&line.text) {
                visitor.visit_bases_line(line.text.trim())?;
                continue;
            }

            match classify(&line.text) {
                Section::Blank => {
                    if self.region == Region::ReadBases {
                        self.region = Region::Reads;
                    }
                }
                Section::QualityClip => {
                    self.region = Region::Reads;
                    let clip = parse_quality_clip(&line)?;
                    clip_seen = true;
                    visitor.visit_quality_line(clip)?;
                }
                Section::TraceDescription => {
                    self.region = Region::Reads;
                    let description = parse_trace_description(&line)?;
                    visitor.visit_trace_description(&description)?;
                }
                Section::Unrecognized => {
                    trace!(line = line.number, read = %header.read_id, "Ignoring unrecognized line in read");
                }
                _ => {
                    self.pending = Some(line);
                    Self::finish_read(header, header_line, clip_seen, visitor)?;
                    return Ok(Flow::Closed);
                }
            }
        }
    }

    fn finish_read(
        header: &ReadHeader,
        header_line: u64,
        clip_seen: bool,
        visitor: &mut (dyn AceReadVisitor + '_),
    ) -> Result<(), ParseError> {
        if !clip_seen {
            return Err(ParseError::MissingRecord {
                line: header_line,
                read_id: header.read_id.clone(),
                record: "QA",
            });
        }
        visitor.visit_end()
    }

    fn flush_qualities(&mut self, visitor: &mut (dyn AceContigVisitor + '_)) -> Result<(), ParseError> {
        match self.qualities.take() {
            Some(qualities) => visitor.visit_consensus_qualities(&qualities),
            None => Ok(()),
        }
    }

    fn close_contig(
        &mut self,
        header: &ContigHeader,
        reads_seen: usize,
        visitor: &mut (dyn AceContigVisitor + '_),
    ) -> Result<(), ParseError> {
        self.region = Region::NotInContig;
        if reads_seen != header.num_reads {
            return Err(ParseError::ReadCountMismatch {
                contig: header.id.clone(),
                expected: header.num_reads,
                seen: reads_seen,
            });
        }
        visitor.visit_end()
    }

    /// Read a tag's header line and body lines up to the closing `}`.
    /// `None` when the pass was halted inside the block.
    fn tag_block(
        &mut self,
        open: &Line,
        block: &'static str,
    ) -> Result<Option<(Line, Vec<String>)>, ParseError> {
        let unterminated = || ParseError::UnterminatedTag {
            line: open.number,
            block,
        };
        let header = self.next_line()?.ok_or_else(unterminated)?;
        if header.text.trim() == "}" {
            return Err(ParseError::Malformed {
                line: header.number,
                record: block,
                message: "tag block has no header line".to_string(),
            });
        }
        let mut body = Vec::new();
        loop {
            if self.is_halted() {
                return Ok(None);
            }
            let line = self.next_line()?.ok_or_else(unterminated)?;
            if line.text.trim() == "}" {
                return Ok(Some((header, body)));
            }
            body.push(line.text);
        }
    }

    fn read_tag(&mut self, visitor: &mut dyn AceFileVisitor, open: &Line) -> Result<Flow, ParseError> {
        let Some((header_line, body)) = self.tag_block(open, "RT")? else {
            return Ok(Flow::Halted);
        };
        let header = parse_read_tag_header(&header_line)?;
        let tag = ReadTag {
            read_id: header.read_id,
            tag_type: header.tag_type,
            creator: header.creator,
            range: header.range,
            created: header.created,
            transient: header.transient,
            data: body.join("\n"),
        };
        visitor.visit_read_tag(&self.callback(None), tag)?;
        Ok(Flow::Closed)
    }

    fn whole_assembly_tag(
        &mut self,
        visitor: &mut dyn AceFileVisitor,
        open: &Line,
    ) -> Result<Flow, ParseError> {
        let Some((header_line, body)) = self.tag_block(open, "WA")? else {
            return Ok(Flow::Halted);
        };
        let header = parse_whole_assembly_tag_header(&header_line)?;
        let tag = WholeAssemblyTag {
            tag_type: header.tag_type,
            creator: header.creator,
            created: header.created,
            data: body.join("\n"),
        };
        visitor.visit_whole_assembly_tag(&self.callback(None), tag)?;
        Ok(Flow::Closed)
    }

    fn consensus_tag(
        &mut self,
        visitor: &mut dyn AceFileVisitor,
        open: &Line,
    ) -> Result<Flow, ParseError> {
        let header_line = self.next_line()?.ok_or(ParseError::UnterminatedTag {
            line: open.number,
            block: "CT",
        })?;
        let header = parse_consensus_tag_header(&header_line)?;
        let callback = self.callback(None);

        match visitor.visit_consensus_tag(&callback, &header)? {
            VisitDecision::Visit(mut tag_visitor) => self.consensus_tag_body(open, tag_visitor.as_mut()),
            VisitDecision::Skip => self.consensus_tag_body(open, &mut Skipped),
        }
    }

    fn consensus_tag_body<'v>(
        &mut self,
        open: &Line,
        visitor: &mut (dyn AceConsensusTagVisitor + 'v),
    ) -> Result<Flow, ParseError> {
        loop {
            if self.is_halted() {
                visitor.halted();
                return Ok(Flow::Halted);
            }
            let line = self.next_line()?.ok_or(ParseError::UnterminatedTag {
                line: open.number,
                block: "CT",
            })?;

            match line.text.trim() {
                "}" => {
                    visitor.visit_end()?;
                    return Ok(Flow::Closed);
                }
                "COMMENT{" => {
                    let mut comment = Vec::new();
                    loop {
                        if self.is_halted() {
                            visitor.halted();
                            return Ok(Flow::Halted);
                        }
                        let inner = self.next_line()?.ok_or(ParseError::UnterminatedTag {
                            line: line.number,
                            block: "COMMENT",
                        })?;
                        if inner.text.trim() == "C}" {
                            break;
                        }
                        comment.push(inner.text);
                    }
                    visitor.visit_comment(&comment.join("\n"))?;
                }
                _ => visitor.visit_data(&line.text)?,
            }
        }
    }
}
