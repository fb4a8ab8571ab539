//! Line classification and per-record field parsing.
//!
//! `classify` looks only at the record key and never fails; the `parse_*`
//! functions validate the fields and report malformed records.
//!
//! | Key | Record | Fields |
//! |-----|--------|--------|
//! | `AS` | file header | contigs, reads |
//! | `CO` | contig header | id, bases, reads, base segments, `U`/`C` |
//! | `BQ` | consensus qualities | integers on following lines |
//! | `AF` | read placement | read, `U`/`C`, 1-based gapped start |
//! | `BS` | base segment | begin, end, read |
//! | `RD` | read header | read, gapped length, info items, tags |
//! | `QA` | clear ranges | qual left/right, align left/right |
//! | `DS` | trace description | `CHROMAT_FILE:`, `PHD_FILE:`, `TIME:` |
//! | `RT{` `WA{` `CT{` | tag blocks | closed by `}` |

use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::core::tag::ConsensusTagHeader;
use crate::core::types::{Direction, Range};
use crate::parsing::line::Line;
use crate::parsing::parser::ParseError;
use crate::parsing::timestamp::{parse_tag_time, parse_trace_time};

/// Kind of a raw line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    FileHeader,
    ContigHeader,
    ConsensusQualities,
    AlignedRead,
    BaseSegment,
    ReadHeader,
    QualityClip,
    TraceDescription,
    ReadTag,
    WholeAssemblyTag,
    ConsensusTag,
    Blank,
    Unrecognized,
}

impl Section {
    /// True for sections that close an open contig
    #[must_use]
    pub fn ends_contig(self) -> bool {
        matches!(
            self,
            Self::FileHeader
                | Self::ContigHeader
                | Self::ReadTag
                | Self::WholeAssemblyTag
                | Self::ConsensusTag
        )
    }

    #[must_use]
    pub fn is_tag(self) -> bool {
        matches!(
            self,
            Self::ReadTag | Self::WholeAssemblyTag | Self::ConsensusTag
        )
    }
}

/// Classify a line by its record key
#[must_use]
pub fn classify(text: &str) -> Section {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Section::Blank;
    }
    if opens_block(trimmed, "RT") {
        return Section::ReadTag;
    }
    if opens_block(trimmed, "WA") {
        return Section::WholeAssemblyTag;
    }
    if opens_block(trimmed, "CT") {
        return Section::ConsensusTag;
    }

    match trimmed.split_whitespace().next() {
        Some("AS") => Section::FileHeader,
        Some("CO") => Section::ContigHeader,
        Some("BQ") => Section::ConsensusQualities,
        Some("AF") => Section::AlignedRead,
        Some("BS") => Section::BaseSegment,
        Some("RD") => Section::ReadHeader,
        Some("QA") => Section::QualityClip,
        Some("DS") => Section::TraceDescription,
        _ => Section::Unrecognized,
    }
}

fn opens_block(text: &str, key: &str) -> bool {
    text.strip_prefix(key)
        .is_some_and(|rest| rest.trim() == "{")
}

/// True for lines made only of IUPAC basecalls and pads
#[must_use]
pub fn is_basecall_line(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && trimmed.bytes().all(|b| {
            matches!(
                b.to_ascii_uppercase(),
                b'A' | b'C'
                    | b'G'
                    | b'T'
                    | b'U'
                    | b'N'
                    | b'R'
                    | b'Y'
                    | b'K'
                    | b'M'
                    | b'S'
                    | b'W'
                    | b'B'
                    | b'D'
                    | b'H'
                    | b'V'
                    | b'X'
                    | b'*'
                    | b'-'
            )
        })
}

/// `AS` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub num_contigs: usize,
    pub num_reads: u64,
}

/// `CO` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigHeader {
    pub id: String,
    pub num_bases: usize,
    pub num_reads: usize,
    pub num_base_segments: usize,
    pub complemented: bool,
}

/// `AF` record with a 0-based gapped start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    pub read_id: String,
    pub direction: Direction,
    pub gapped_start: i64,
}

/// `BS` record with a 0-based range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseSegment {
    pub range: Range,
    pub read_id: String,
}

/// `RD` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadHeader {
    pub read_id: String,
    pub gapped_length: usize,
    pub num_info_items: usize,
    pub num_read_tags: usize,
}

/// `QA` record, raw 1-based gapped coordinates into the full read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityClip {
    pub qual_left: i64,
    pub qual_right: i64,
    pub align_left: i64,
    pub align_right: i64,
}

impl QualityClip {
    /// Clip covering a whole read of `gapped_length`
    #[must_use]
    pub fn full(gapped_length: usize) -> Self {
        let len = crate::core::types::to_i64(gapped_length);
        Self {
            qual_left: 1,
            qual_right: len,
            align_left: 1,
            align_right: len,
        }
    }

    /// 0-based gapped clear range: the intersection of the quality and
    /// alignment clips. `None` when the read has no usable bases.
    #[must_use]
    pub fn clear_range(&self) -> Option<Range> {
        if self.qual_left == -1 && self.qual_right == -1 {
            return None;
        }
        let left = self.qual_left.max(self.align_left);
        let right = self.qual_right.min(self.align_right);
        if left < 1 || right < left {
            None
        } else {
            Some(Range::from_one_based(left, right))
        }
    }
}

/// `DS` record; every field is optional in the wild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceDescription {
    pub chromat_file: Option<String>,
    pub phd_file: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
}

/// Header line of an `RT{` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTagHeader {
    pub read_id: String,
    pub tag_type: String,
    pub creator: String,
    pub range: Range,
    pub created: NaiveDateTime,
    pub transient: bool,
}

/// Header line of a `WA{` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WholeAssemblyTagHeader {
    pub tag_type: String,
    pub creator: String,
    pub created: NaiveDateTime,
}

struct Fields<'a> {
    line: &'a Line,
    record: &'static str,
    values: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(line: &'a Line, record: &'static str, skip_key: bool) -> Self {
        let values = line
            .text
            .split_whitespace()
            .skip(usize::from(skip_key))
            .collect();
        Self {
            line,
            record,
            values,
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError::Malformed {
            line: self.line.number,
            record: self.record,
            message,
        }
    }

    fn require(&self, count: usize) -> Result<(), ParseError> {
        if self.values.len() < count {
            return Err(self.error(format!(
                "expected {count} fields, found {}",
                self.values.len()
            )));
        }
        Ok(())
    }

    fn text(&self, index: usize) -> String {
        self.values[index].to_string()
    }

    fn number<T: FromStr>(&self, index: usize, name: &str) -> Result<T, ParseError> {
        self.values[index]
            .parse()
            .map_err(|_| self.error(format!("invalid {name} '{}'", self.values[index])))
    }

    fn direction(&self, index: usize) -> Result<Direction, ParseError> {
        Direction::from_flag(self.values[index]).ok_or_else(|| {
            self.error(format!(
                "invalid direction '{}', expected U or C",
                self.values[index]
            ))
        })
    }

    fn tag_time(&self, index: usize) -> Result<NaiveDateTime, ParseError> {
        parse_tag_time(self.values[index])
            .ok_or_else(|| self.error(format!("invalid timestamp '{}'", self.values[index])))
    }
}

/// Parse `AS <numContigs> <numReads>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or non-numeric fields.
pub fn parse_file_header(line: &Line) -> Result<FileHeader, ParseError> {
    let fields = Fields::new(line, "AS", true);
    fields.require(2)?;
    Ok(FileHeader {
        num_contigs: fields.number(0, "contig count")?,
        num_reads: fields.number(1, "read count")?,
    })
}

/// Parse `CO <id> <numBases> <numReads> <numBaseSegments> <U|C>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_contig_header(line: &Line) -> Result<ContigHeader, ParseError> {
    let fields = Fields::new(line, "CO", true);
    fields.require(5)?;
    Ok(ContigHeader {
        id: fields.text(0),
        num_bases: fields.number(1, "base count")?,
        num_reads: fields.number(2, "read count")?,
        num_base_segments: fields.number(3, "base segment count")?,
        complemented: fields.direction(4)? == Direction::Reverse,
    })
}

/// Parse `AF <readId> <U|C> <gappedStart>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_aligned_read(line: &Line) -> Result<AlignedRead, ParseError> {
    let fields = Fields::new(line, "AF", true);
    fields.require(3)?;
    let start: i64 = fields.number(2, "start offset")?;
    Ok(AlignedRead {
        read_id: fields.text(0),
        direction: fields.direction(1)?,
        gapped_start: start - 1,
    })
}

/// Parse `BS <begin> <end> <readId>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_base_segment(line: &Line) -> Result<BaseSegment, ParseError> {
    let fields = Fields::new(line, "BS", true);
    fields.require(3)?;
    let begin: i64 = fields.number(0, "begin")?;
    let end: i64 = fields.number(1, "end")?;
    if end < begin {
        return Err(fields.error(format!("end {end} precedes begin {begin}")));
    }
    Ok(BaseSegment {
        range: Range::from_one_based(begin, end),
        read_id: fields.text(2),
    })
}

/// Parse `RD <readId> <gappedLength> <numInfoItems> <numReadTags>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_read_header(line: &Line) -> Result<ReadHeader, ParseError> {
    let fields = Fields::new(line, "RD", true);
    fields.require(2)?;
    let num_info_items = if fields.values.len() > 2 {
        fields.number(2, "info item count")?
    } else {
        0
    };
    let num_read_tags = if fields.values.len() > 3 {
        fields.number(3, "read tag count")?
    } else {
        0
    };
    Ok(ReadHeader {
        read_id: fields.text(0),
        gapped_length: fields.number(1, "gapped length")?,
        num_info_items,
        num_read_tags,
    })
}

/// Parse `QA <qualLeft> <qualRight> <alignLeft> <alignRight>`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or non-numeric fields.
pub fn parse_quality_clip(line: &Line) -> Result<QualityClip, ParseError> {
    let fields = Fields::new(line, "QA", true);
    fields.require(4)?;
    Ok(QualityClip {
        qual_left: fields.number(0, "quality left")?,
        qual_right: fields.number(1, "quality right")?,
        align_left: fields.number(2, "align left")?,
        align_right: fields.number(3, "align right")?,
    })
}

/// Parse a `DS` line made of `KEY: value` pairs
///
/// # Errors
///
/// Returns `ParseError::Malformed` when `TIME:` is present but unreadable.
pub fn parse_trace_description(line: &Line) -> Result<TraceDescription, ParseError> {
    let fields = Fields::new(line, "DS", true);
    let mut pairs: Vec<(&str, Vec<&str>)> = Vec::new();
    for &token in &fields.values {
        if let Some(key) = token.strip_suffix(':') {
            pairs.push((key, Vec::new()));
        } else if let Some((_, values)) = pairs.last_mut() {
            values.push(token);
        }
    }

    let mut description = TraceDescription::default();
    for (key, values) in pairs {
        match key {
            "CHROMAT_FILE" => description.chromat_file = values.first().map(|s| (*s).to_string()),
            "PHD_FILE" => description.phd_file = values.first().map(|s| (*s).to_string()),
            "TIME" => {
                let value = values.join(" ");
                description.timestamp = Some(
                    parse_trace_time(&value)
                        .ok_or_else(|| fields.error(format!("invalid TIME '{value}'")))?,
                );
            }
            _ => {}
        }
    }
    Ok(description)
}

/// Parse the first line inside `RT{`: `readId type creator start end time`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_read_tag_header(line: &Line) -> Result<ReadTagHeader, ParseError> {
    let fields = Fields::new(line, "RT", false);
    fields.require(6)?;
    let begin: i64 = fields.number(3, "start")?;
    let end: i64 = fields.number(4, "end")?;
    Ok(ReadTagHeader {
        read_id: fields.text(0),
        tag_type: fields.text(1),
        creator: fields.text(2),
        range: Range::from_one_based(begin, end),
        created: fields.tag_time(5)?,
        transient: fields.values.get(6) == Some(&"NoTrans"),
    })
}

/// Parse the first line inside `WA{`: `type creator time`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_whole_assembly_tag_header(line: &Line) -> Result<WholeAssemblyTagHeader, ParseError> {
    let fields = Fields::new(line, "WA", false);
    fields.require(3)?;
    Ok(WholeAssemblyTagHeader {
        tag_type: fields.text(0),
        creator: fields.text(1),
        created: fields.tag_time(2)?,
    })
}

/// Parse the first line inside `CT{`: `contig type creator start end time [NoTrans]`
///
/// # Errors
///
/// Returns `ParseError::Malformed` on missing or invalid fields.
pub fn parse_consensus_tag_header(line: &Line) -> Result<ConsensusTagHeader, ParseError> {
    let fields = Fields::new(line, "CT", false);
    fields.require(6)?;
    let begin: i64 = fields.number(3, "start")?;
    let end: i64 = fields.number(4, "end")?;
    Ok(ConsensusTagHeader {
        contig_id: fields.text(0),
        tag_type: fields.text(1),
        creator: fields.text(2),
        range: Range::from_one_based(begin, end),
        created: fields.tag_time(5)?,
        transient: fields.values.get(6) == Some(&"NoTrans"),
    })
}

/// Parse whitespace separated qualities from a `BQ` body line
///
/// # Errors
///
/// Returns `ParseError::Malformed` when a value is not a quality in 0..=255.
pub fn parse_quality_values(line: &Line, into: &mut Vec<u8>) -> Result<(), ParseError> {
    let fields = Fields::new(line, "BQ", false);
    for index in 0..fields.values.len() {
        into.push(fields.number(index, "quality")?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> Line {
        Line {
            text: text.to_string(),
            offset: 0,
            number: 7,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("AS 2 10"), Section::FileHeader);
        assert_eq!(classify("CO Contig1 100 2 3 U"), Section::ContigHeader);
        assert_eq!(classify("BQ"), Section::ConsensusQualities);
        assert_eq!(classify("AF read1 U 1"), Section::AlignedRead);
        assert_eq!(classify("BS 1 10 read1"), Section::BaseSegment);
        assert_eq!(classify("RD read1 10 0 0"), Section::ReadHeader);
        assert_eq!(classify("QA 1 10 1 10"), Section::QualityClip);
        assert_eq!(classify("DS CHROMAT_FILE: a"), Section::TraceDescription);
        assert_eq!(classify("RT{"), Section::ReadTag);
        assert_eq!(classify("WA{"), Section::WholeAssemblyTag);
        assert_eq!(classify("CT {"), Section::ConsensusTag);
        assert_eq!(classify("   "), Section::Blank);
        assert_eq!(classify(" 20 30 40"), Section::Unrecognized);
        assert_eq!(classify("ACGT*acgt"), Section::Unrecognized);
        assert_eq!(classify("CTG"), Section::Unrecognized);
    }

    #[test]
    fn test_basecall_lines() {
        assert!(is_basecall_line("ACGTN*acgtn"));
        assert!(is_basecall_line("RYKM"));
        assert!(!is_basecall_line(""));
        assert!(!is_basecall_line("AF read1 U 1"));
        assert!(!is_basecall_line(" 20 30"));
    }

    #[test]
    fn test_parse_contig_header() {
        let header = parse_contig_header(&line("CO Contig1 1400 3 24 C")).unwrap();
        assert_eq!(header.id, "Contig1");
        assert_eq!(header.num_bases, 1400);
        assert_eq!(header.num_reads, 3);
        assert_eq!(header.num_base_segments, 24);
        assert!(header.complemented);
    }

    #[test]
    fn test_parse_contig_header_errors() {
        let err = parse_contig_header(&line("CO Contig1 abc 3 24 U")).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 7, record: "CO", .. }));
        assert!(parse_contig_header(&line("CO Contig1 10 3")).is_err());
        assert!(parse_contig_header(&line("CO Contig1 10 3 1 X")).is_err());
    }

    #[test]
    fn test_parse_aligned_read_negative_offset() {
        let af = parse_aligned_read(&line("AF read1 C -4")).unwrap();
        assert_eq!(af.read_id, "read1");
        assert_eq!(af.direction, Direction::Reverse);
        assert_eq!(af.gapped_start, -5);
    }

    #[test]
    fn test_parse_base_segment() {
        let bs = parse_base_segment(&line("BS 1 4 read1")).unwrap();
        assert_eq!(bs.range, Range::new(0, 3));
        assert!(parse_base_segment(&line("BS 5 4 read1")).is_err());
    }

    #[test]
    fn test_quality_clip_clear_range() {
        let qa = parse_quality_clip(&line("QA 3 90 5 80")).unwrap();
        assert_eq!(qa.clear_range(), Some(Range::new(4, 79)));

        let none = parse_quality_clip(&line("QA -1 -1 1 80")).unwrap();
        assert_eq!(none.clear_range(), None);

        let inverted = parse_quality_clip(&line("QA 50 40 1 80")).unwrap();
        assert_eq!(inverted.clear_range(), None);
    }

    #[test]
    fn test_parse_trace_description() {
        let ds = parse_trace_description(&line(
            "DS CHROMAT_FILE: read1 PHD_FILE: read1.phd.1 TIME: Thu Sep 23 10:48:44 2004 CHEM: term",
        ))
        .unwrap();
        assert_eq!(ds.chromat_file.as_deref(), Some("read1"));
        assert_eq!(ds.phd_file.as_deref(), Some("read1.phd.1"));
        assert!(ds.timestamp.is_some());

        let bare = parse_trace_description(&line("DS")).unwrap();
        assert_eq!(bare, TraceDescription::default());

        assert!(parse_trace_description(&line("DS TIME: someday")).is_err());
    }

    #[test]
    fn test_parse_tag_headers() {
        let ct = parse_consensus_tag_header(&line(
            "Contig1 comment consed 5 8 040923:104844 NoTrans",
        ))
        .unwrap();
        assert_eq!(ct.range, Range::new(4, 7));
        assert!(ct.transient);

        let rt = parse_read_tag_header(&line("read1 matchElsewhere phrap 2 4 040923:104844")).unwrap();
        assert_eq!(rt.read_id, "read1");
        assert!(!rt.transient);

        let wa = parse_whole_assembly_tag_header(&line("phrap_params phrap 040923:104844")).unwrap();
        assert_eq!(wa.tag_type, "phrap_params");
        assert!(parse_whole_assembly_tag_header(&line("phrap_params phrap")).is_err());
    }

    #[test]
    fn test_parse_quality_values() {
        let mut quals = Vec::new();
        parse_quality_values(&line(" 20 30  40"), &mut quals).unwrap();
        assert_eq!(quals, vec![20, 30, 40]);
        assert!(parse_quality_values(&line(" 20 x"), &mut quals).is_err());
    }
}
