//! Streaming ACE writer.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use super::{WriteError, LINE_WIDTH};
use crate::assembly::segment::compute_base_segments;
use crate::core::contig::Contig;
use crate::core::lookup::{SharedQualities, SharedSequences};
use crate::core::read::AssembledRead;
use crate::core::sequence::reverse_complement;
use crate::core::tag::{ConsensusTag, ReadTag, TagSet, WholeAssemblyTag};
use crate::core::types::{to_i64, Direction, GAP, HIGH_QUALITY_THRESHOLD};
use crate::parsing::timestamp::{format_tag_time, format_trace_time};

/// Writes contigs and tags as an ACE file.
///
/// The `AS` header needs the final contig and read counts, so contigs are
/// spooled to an anonymous temporary file and copied behind the header by
/// [`finish`](Self::finish). Tags are written after all contigs.
pub struct AceWriter<W: Write> {
    out: W,
    spool: BufWriter<File>,
    tags: String,
    num_contigs: usize,
    num_reads: u64,
    quality_threshold: u8,
    base_segments: bool,
    qualities: Option<SharedQualities>,
    sequences: Option<SharedSequences>,
}

impl AceWriter<BufWriter<File>> {
    /// Writer creating (or truncating) `path`
    ///
    /// # Errors
    ///
    /// Returns `WriteError::Io` if the file or the spool cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> AceWriter<W> {
    /// # Errors
    ///
    /// Returns `WriteError::Io` if the spool file cannot be created.
    pub fn new(out: W) -> Result<Self, WriteError> {
        Ok(Self {
            out,
            spool: BufWriter::new(tempfile::tempfile()?),
            tags: String::new(),
            num_contigs: 0,
            num_reads: 0,
            quality_threshold: HIGH_QUALITY_THRESHOLD,
            base_segments: false,
            qualities: None,
            sequences: None,
        })
    }

    /// Bases with a quality below `threshold` are written in lowercase
    #[must_use]
    pub fn with_quality_threshold(mut self, threshold: u8) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Emit `BS` records computed from each contig's reads
    #[must_use]
    pub fn with_base_segments(mut self, enabled: bool) -> Self {
        self.base_segments = enabled;
        self
    }

    /// Case-encode read bases from their full qualities
    #[must_use]
    pub fn with_qualities(mut self, qualities: SharedQualities) -> Self {
        self.qualities = Some(qualities);
        self
    }

    /// Write untrimmed reads, clipping them with `QA`
    #[must_use]
    pub fn with_sequences(mut self, sequences: SharedSequences) -> Self {
        self.sequences = Some(sequences);
        self
    }

    #[must_use]
    pub fn num_contigs(&self) -> usize {
        self.num_contigs
    }

    #[must_use]
    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    /// Append one contig with all of its reads
    ///
    /// # Errors
    ///
    /// Returns `WriteError::Io` on write failure,
    /// `WriteError::SequenceLengthMismatch` when a full read sequence does
    /// not fit its read, or `WriteError::BaseSegments` when base segments
    /// are enabled and cannot be computed.
    pub fn write_contig(&mut self, contig: &Contig) -> Result<(), WriteError> {
        let segments = if self.base_segments {
            compute_base_segments(contig.consensus(), contig.reads())?
        } else {
            Vec::new()
        };

        let records = contig
            .reads()
            .iter()
            .map(|read| self.read_record(read))
            .collect::<Result<Vec<_>, _>>()?;

        let out = &mut self.spool;
        writeln!(
            out,
            "CO {} {} {} {} {}",
            contig.id(),
            contig.consensus().len(),
            contig.num_reads(),
            segments.len(),
            if contig.is_complemented() { 'C' } else { 'U' }
        )?;

        let quality = contig.gapped_consensus_quality();
        let consensus = case_encode(
            contig.consensus().as_bytes(),
            |i| quality.get(i).copied(),
            self.quality_threshold,
        );
        write_wrapped(out, &consensus)?;
        writeln!(out)?;

        writeln!(out, "BQ")?;
        for chunk in contig.consensus_quality().chunks(LINE_WIDTH) {
            let mut line = String::with_capacity(chunk.len() * 3);
            for q in chunk {
                let _ = write!(line, " {q}");
            }
            writeln!(out, "{line}")?;
        }
        writeln!(out)?;

        for record in &records {
            writeln!(out, "AF {} {} {}", record.id, record.direction, record.start + 1)?;
        }
        for segment in &segments {
            writeln!(
                out,
                "BS {} {} {}",
                segment.range.begin + 1,
                segment.range.end + 1,
                segment.read_id
            )?;
        }
        writeln!(out)?;

        for (record, read) in records.iter().zip(contig.reads()) {
            writeln!(out, "RD {} {} 0 0", record.id, record.bases.len())?;
            write_wrapped(out, &record.bases)?;
            writeln!(out)?;
            writeln!(
                out,
                "QA {first} {last} {first} {last}",
                first = record.clear.0,
                last = record.clear.1
            )?;
            let trace = read.trace();
            let mut ds = format!(
                "DS CHROMAT_FILE: {} PHD_FILE: {}",
                trace.chromat_file, trace.phd_file
            );
            if let Some(time) = &trace.timestamp {
                let _ = write!(ds, " TIME: {}", format_trace_time(time));
            }
            writeln!(out, "{ds}")?;
            writeln!(out)?;
        }

        self.num_contigs += 1;
        self.num_reads += contig.num_reads() as u64;
        trace!(contig = contig.id(), reads = contig.num_reads(), "Wrote contig");
        Ok(())
    }

    /// Bases, placement and clear range of one `RD` record
    fn read_record(&self, read: &AssembledRead) -> Result<ReadRecord, WriteError> {
        let full_length = read.full_length();
        let valid = read.valid_range();
        // ungapped offset of the first valid base in contig orientation
        let valid_start = match read.direction() {
            Direction::Forward => valid.begin,
            Direction::Reverse => to_i64(full_length) - 1 - valid.end,
        };
        let full_qualities = self
            .qualities
            .as_ref()
            .and_then(|lookup| lookup.qualities(read.id()));
        let case = |placed: i64| -> Option<u8> {
            let quals = full_qualities?;
            let index = match read.direction() {
                Direction::Forward => placed,
                Direction::Reverse => to_i64(full_length) - 1 - placed,
            };
            usize::try_from(index).ok().and_then(|i| quals.get(i).copied())
        };

        let full_sequence = self
            .sequences
            .as_ref()
            .and_then(|lookup| lookup.sequence(read.id()));
        let (gapped, first_placed, left_clip) = match full_sequence {
            Some(full) => {
                if full.len() != full_length {
                    return Err(WriteError::SequenceLengthMismatch {
                        read_id: read.id().to_string(),
                        expected: full_length,
                        actual: full.len(),
                    });
                }
                let placed = match read.direction() {
                    Direction::Forward => full.to_ascii_uppercase(),
                    Direction::Reverse => reverse_complement(&full.to_ascii_uppercase()),
                };
                let left = usize::try_from(valid_start).unwrap_or(0).min(placed.len());
                let right = (left + read.bases().ungapped_len()).min(placed.len());
                let mut bases = Vec::with_capacity(placed.len() + read.bases().num_gaps());
                bases.extend_from_slice(&placed[..left]);
                bases.extend_from_slice(read.bases().as_bytes());
                bases.extend_from_slice(&placed[right..]);
                (bases, 0, left)
            }
            None => (read.bases().as_bytes().to_vec(), valid_start, 0),
        };

        let mut ungapped = first_placed;
        let placed_quality: Vec<Option<u8>> = gapped
            .iter()
            .map(|&b| {
                if b == GAP {
                    None
                } else {
                    let q = case(ungapped);
                    ungapped += 1;
                    q
                }
            })
            .collect();
        let bases = case_encode(&gapped, |i| placed_quality[i], self.quality_threshold);

        let clip_start = to_i64(left_clip);
        let clear = (clip_start + 1, clip_start + to_i64(read.bases().len()));
        Ok(ReadRecord {
            id: read.id().to_string(),
            direction: read.direction(),
            start: read.offset() - clip_start,
            bases,
            clear,
        })
    }

    /// Queue a `WA{}` block
    pub fn write_whole_assembly_tag(&mut self, tag: &WholeAssemblyTag) {
        let _ = writeln!(self.tags, "\nWA{{");
        let _ = writeln!(
            self.tags,
            "{} {} {}",
            tag.tag_type,
            tag.creator,
            format_tag_time(&tag.created)
        );
        if !tag.data.is_empty() {
            let _ = writeln!(self.tags, "{}", tag.data);
        }
        let _ = writeln!(self.tags, "}}");
    }

    /// Queue a `CT{}` block
    pub fn write_consensus_tag(&mut self, tag: &ConsensusTag) {
        let _ = writeln!(self.tags, "\nCT{{");
        let _ = writeln!(
            self.tags,
            "{} {} {} {} {} {}{}",
            tag.contig_id,
            tag.tag_type,
            tag.creator,
            tag.range.begin + 1,
            tag.range.end + 1,
            format_tag_time(&tag.created),
            if tag.transient { " NoTrans" } else { "" }
        );
        for line in &tag.data {
            let _ = writeln!(self.tags, "{line}");
        }
        for comment in &tag.comments {
            let _ = writeln!(self.tags, "COMMENT{{\n{comment}\nC}}");
        }
        let _ = writeln!(self.tags, "}}");
    }

    /// Queue an `RT{}` block
    pub fn write_read_tag(&mut self, tag: &ReadTag) {
        let _ = writeln!(self.tags, "\nRT{{");
        let _ = writeln!(
            self.tags,
            "{} {} {} {} {} {}{}",
            tag.read_id,
            tag.tag_type,
            tag.creator,
            tag.range.begin + 1,
            tag.range.end + 1,
            format_tag_time(&tag.created),
            if tag.transient { " NoTrans" } else { "" }
        );
        if !tag.data.is_empty() {
            let _ = writeln!(self.tags, "{}", tag.data);
        }
        let _ = writeln!(self.tags, "}}");
    }

    /// Queue every tag of `tags`, whole-assembly tags first
    pub fn write_tags(&mut self, tags: &TagSet) {
        for tag in &tags.whole_assembly {
            self.write_whole_assembly_tag(tag);
        }
        for tag in &tags.consensus {
            self.write_consensus_tag(tag);
        }
        for tag in &tags.read {
            self.write_read_tag(tag);
        }
    }

    /// Write the header, the spooled contigs and the tags; returns the
    /// flushed output
    ///
    /// # Errors
    ///
    /// Returns `WriteError::Io` on any write or spool failure.
    pub fn finish(mut self) -> Result<W, WriteError> {
        writeln!(self.out, "AS {} {}", self.num_contigs, self.num_reads)?;
        writeln!(self.out)?;

        let mut spool = self.spool.into_inner().map_err(|e| e.into_error())?;
        spool.seek(SeekFrom::Start(0))?;
        std::io::copy(&mut spool, &mut self.out)?;

        self.out.write_all(self.tags.as_bytes())?;
        self.out.flush()?;
        debug!(
            contigs = self.num_contigs,
            reads = self.num_reads,
            "Finished ACE output"
        );
        Ok(self.out)
    }
}

struct ReadRecord {
    id: String,
    direction: Direction,
    /// 0-based gapped consensus offset of the first written base
    start: i64,
    bases: Vec<u8>,
    /// 1-based inclusive clear range within `bases`
    clear: (i64, i64),
}

/// Lowercase every base whose quality is known and below `threshold`
fn case_encode(bases: &[u8], quality: impl Fn(usize) -> Option<u8>, threshold: u8) -> Vec<u8> {
    bases
        .iter()
        .enumerate()
        .map(|(i, &b)| match quality(i) {
            Some(q) if q < threshold && b != GAP => b.to_ascii_lowercase(),
            _ => b,
        })
        .collect()
}

fn write_wrapped(out: &mut impl Write, bases: &[u8]) -> std::io::Result<()> {
    for chunk in bases.chunks(LINE_WIDTH) {
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::builder::{ContigBuilder, ReadBuilder};
    use crate::core::read::TraceInfo;
    use crate::core::sequence::GappedSequence;
    use crate::core::types::Range;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn contig() -> Contig {
        let mut builder = ContigBuilder::new("ctg1", GappedSequence::new("ACGT*ACG"));
        builder
            .add_read(ReadBuilder::new("r1", GappedSequence::new("ACGT*ACG"), 0, Direction::Forward))
            .unwrap();
        builder
            .add_read(
                ReadBuilder::new("r2", GappedSequence::new("GT*AC"), 2, Direction::Reverse)
                    .with_valid_range(Range::new(1, 4), 6)
                    .with_trace(TraceInfo::for_read("r2")),
            )
            .unwrap();
        builder.set_consensus_quality(vec![40, 40, 10, 40, 40, 40, 40]);
        builder.build().unwrap()
    }

    fn render(writer: AceWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_contig_layout() {
        let mut writer = AceWriter::new(Vec::new()).unwrap();
        writer.write_contig(&contig()).unwrap();
        let text = render(writer);
        let expected = "AS 1 2

CO ctg1 8 2 0 U
ACgT*ACG

BQ
 40 40 10 40 40 40 40

AF r1 U 1
AF r2 C 3

RD r1 8 0 0
ACGT*ACG

QA 1 8 1 8
DS CHROMAT_FILE: r1 PHD_FILE: r1.phd.1

RD r2 5 0 0
GT*AC

QA 1 5 1 5
DS CHROMAT_FILE: r2 PHD_FILE: r2.phd.1

";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_long_lines_wrap_at_fifty() {
        let consensus = "A".repeat(120);
        let mut builder = ContigBuilder::new("long", GappedSequence::new(&consensus));
        builder
            .add_read(ReadBuilder::new("r1", GappedSequence::new(&consensus), 0, Direction::Forward))
            .unwrap();
        let mut writer = AceWriter::new(Vec::new()).unwrap();
        writer.write_contig(&builder.build().unwrap()).unwrap();
        let text = render(writer);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[3].len(), 50);
        assert_eq!(lines[4].len(), 50);
        assert_eq!(lines[5].len(), 20);
        assert_eq!(lines[8].split_whitespace().count(), 50);
        assert!(lines[8].starts_with(" 30"));
    }

    #[test]
    fn test_untrimmed_reads_with_sequences() {
        let mut sequences: HashMap<String, Vec<u8>> = HashMap::new();
        sequences.insert("r1".to_string(), b"ACGTACG".to_vec());
        // r2 original orientation; placed it reads TGTACA
        sequences.insert("r2".to_string(), b"TGTACA".to_vec());
        let mut writer = AceWriter::new(Vec::new())
            .unwrap()
            .with_sequences(Arc::new(sequences));
        writer.write_contig(&contig()).unwrap();
        let text = render(writer);
        assert!(text.contains("AF r2 C 2\n"));
        assert!(text.contains("RD r2 7 0 0\nTGT*ACA\n\nQA 2 6 2 6\n"));
    }

    #[test]
    fn test_read_case_from_qualities() {
        let mut qualities: HashMap<String, Vec<u8>> = HashMap::new();
        qualities.insert("r1".to_string(), vec![40, 10, 40, 40, 40, 40, 40]);
        let mut writer = AceWriter::new(Vec::new())
            .unwrap()
            .with_qualities(Arc::new(qualities));
        writer.write_contig(&contig()).unwrap();
        assert!(render(writer).contains("RD r1 8 0 0\nAcGT*ACG\n"));
    }

    #[test]
    fn test_sequence_length_mismatch() {
        let mut sequences: HashMap<String, Vec<u8>> = HashMap::new();
        sequences.insert("r1".to_string(), b"ACG".to_vec());
        let mut writer = AceWriter::new(Vec::new())
            .unwrap()
            .with_sequences(Arc::new(sequences));
        assert!(matches!(
            writer.write_contig(&contig()),
            Err(WriteError::SequenceLengthMismatch { expected: 7, actual: 3, .. })
        ));
    }

    #[test]
    fn test_base_segments_and_tags() {
        let c = contig();
        let mut writer = AceWriter::new(Vec::new()).unwrap().with_base_segments(true);
        writer.write_contig(&c).unwrap();
        let created = crate::parsing::timestamp::parse_tag_time("040923:104844").unwrap();
        writer.write_consensus_tag(&ConsensusTag {
            contig_id: "ctg1".to_string(),
            tag_type: "comment".to_string(),
            creator: "consed".to_string(),
            range: Range::new(0, 3),
            created,
            transient: true,
            data: vec!["note".to_string()],
            comments: vec!["first\nsecond".to_string()],
        });
        let text = render(writer);
        assert!(text.contains("CO ctg1 8 2 1 U\n"));
        assert!(text.contains("BS 1 8 r1\n"));
        assert!(text.ends_with(
            "\nCT{\nctg1 comment consed 1 4 040923:104844 NoTrans\nnote\nCOMMENT{\nfirst\nsecond\nC}\n}\n"
        ));
    }
}
