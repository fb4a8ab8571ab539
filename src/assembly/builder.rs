//! Mutable contig construction.
//!
//! A [`ContigBuilder`] owns its reads in an arena indexed by id. Editing a
//! read through [`ContigBuilder::read_builder`] hands out a guard; when the
//! guard is dropped the read's new span is posted to the contig's bounds.
//! Reads never point back at their contig, so a [`ReadBuilder`] can be
//! copied into another contig as is.
//!
//! `build()` turns the builder into an immutable [`Contig`]:
//!
//! 1. recall the consensus if a [`ConsensusRecall`] is installed
//! 2. clamp overhanging reads to the consensus
//! 3. trim the consensus to the reads' extent and shift the reads
//! 4. order reads by (start, id)
//! 5. take the supplied consensus quality, recompute it, or fall back to
//!    a constant placeholder

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};

use thiserror::Error;
use tracing::{debug, trace};

use crate::assembly::consensus::ConsensusRecall;
use crate::assembly::quality::ConsensusQualityComputer;
use crate::core::contig::Contig;
use crate::core::lookup::SharedQualities;
use crate::core::read::{AssembledRead, TraceInfo};
use crate::core::sequence::GappedSequence;
use crate::core::types::{to_i64, Direction, Range, DEFAULT_CONSENSUS_QUALITY, GAP};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Contig {0} has already been built")]
    AlreadyBuilt(String),

    #[error("Read {read_id} is already part of contig {contig_id}")]
    DuplicateRead { contig_id: String, read_id: String },

    #[error("Contig {contig_id} has {actual} consensus qualities for {expected} unpadded bases")]
    QualityLengthMismatch {
        contig_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("No read matches the consensus at offset {offset}")]
    NoMatchingRead { offset: i64 },

    #[error("No qualities available for read {0}")]
    MissingQualities(String),
}

/// Mutable form of an [`AssembledRead`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBuilder {
    id: String,
    bases: GappedSequence,
    offset: i64,
    direction: Direction,
    valid_range: Range,
    full_length: usize,
    trace: TraceInfo,
}

impl ReadBuilder {
    /// A read whose bases are the whole original read
    pub fn new(id: impl Into<String>, bases: GappedSequence, offset: i64, direction: Direction) -> Self {
        let id = id.into();
        let ungapped = bases.ungapped_len();
        let trace = TraceInfo::for_read(&id);
        Self {
            id,
            bases,
            offset,
            direction,
            valid_range: Range::of_length(0, ungapped),
            full_length: ungapped,
            trace,
        }
    }

    /// Set the ungapped valid range within a full read of `full_length`
    #[must_use]
    pub fn with_valid_range(mut self, valid_range: Range, full_length: usize) -> Self {
        self.valid_range = valid_range;
        self.full_length = full_length;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceInfo) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn from_read(read: &AssembledRead) -> Self {
        Self {
            id: read.id().to_string(),
            bases: read.bases().clone(),
            offset: read.offset(),
            direction: read.direction(),
            valid_range: read.valid_range(),
            full_length: read.full_length(),
            trace: read.trace().clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn bases(&self) -> &GappedSequence {
        &self.bases
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn valid_range(&self) -> Range {
        self.valid_range
    }

    #[must_use]
    pub fn full_length(&self) -> usize {
        self.full_length
    }

    #[must_use]
    pub fn trace(&self) -> &TraceInfo {
        &self.trace
    }

    /// Gapped consensus span
    #[must_use]
    pub fn gapped_range(&self) -> Range {
        self.bases.range_at(self.offset)
    }

    #[must_use]
    pub fn has_bases(&self) -> bool {
        self.bases.as_bytes().iter().any(|&b| b != GAP)
    }

    pub fn set_offset(&mut self, offset: i64) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn shift(&mut self, amount: i64) -> &mut Self {
        self.offset += amount;
        self
    }

    pub fn set_trace(&mut self, trace: TraceInfo) -> &mut Self {
        self.trace = trace;
        self
    }

    /// Keep only the bases inside `range` (gapped consensus coordinates).
    ///
    /// The valid range shrinks by the real bases removed from each end.
    /// Returns `false` when nothing of the read is left.
    pub fn trim(&mut self, range: &Range) -> bool {
        let Some(keep) = self.gapped_range().intersection(range) else {
            self.bases = GappedSequence::default();
            return false;
        };
        let begin = usize::try_from(keep.begin - self.offset).unwrap_or(0);
        let end = usize::try_from(keep.end - self.offset).unwrap_or(0);

        let bytes = self.bases.as_bytes();
        let removed_left = to_i64(bytes[..begin].iter().filter(|&&b| b != GAP).count());
        let removed_right = to_i64(bytes[end + 1..].iter().filter(|&&b| b != GAP).count());
        let kept = GappedSequence::new(&bytes[begin..=end]);

        self.bases = kept;
        self.offset = keep.begin;
        self.valid_range = match self.direction {
            Direction::Forward => Range::new(
                self.valid_range.begin + removed_left,
                self.valid_range.end - removed_right,
            ),
            Direction::Reverse => Range::new(
                self.valid_range.begin + removed_right,
                self.valid_range.end - removed_left,
            ),
        };
        true
    }

    #[must_use]
    pub fn build(&self) -> AssembledRead {
        self.clone().into_read()
    }

    fn into_read(self) -> AssembledRead {
        AssembledRead::new(
            self.id,
            self.bases,
            self.offset,
            self.direction,
            self.valid_range,
            self.full_length,
            self.trace,
        )
    }
}

/// Multiset of read starts and ends
#[derive(Debug, Clone, Default)]
struct Bounds {
    starts: BTreeMap<i64, usize>,
    ends: BTreeMap<i64, usize>,
}

impl Bounds {
    fn post(&mut self, range: Range) {
        *self.starts.entry(range.begin).or_default() += 1;
        *self.ends.entry(range.end).or_default() += 1;
    }

    fn retract(&mut self, range: Range) {
        decrement(&mut self.starts, range.begin);
        decrement(&mut self.ends, range.end);
    }

    fn extent(&self) -> Option<Range> {
        let begin = *self.starts.keys().next()?;
        let end = *self.ends.keys().next_back()?;
        Some(Range::new(begin, end))
    }
}

fn decrement(counts: &mut BTreeMap<i64, usize>, key: i64) {
    if let Some(count) = counts.get_mut(&key) {
        *count -= 1;
        if *count == 0 {
            counts.remove(&key);
        }
    }
}

/// Exclusive access to one read of a [`ContigBuilder`]; the contig's
/// bounds follow the read's span when the guard is dropped
pub struct ReadBuilderGuard<'a> {
    read: &'a mut ReadBuilder,
    bounds: &'a mut Bounds,
    before: Range,
}

impl Deref for ReadBuilderGuard<'_> {
    type Target = ReadBuilder;

    fn deref(&self) -> &ReadBuilder {
        self.read
    }
}

impl DerefMut for ReadBuilderGuard<'_> {
    fn deref_mut(&mut self) -> &mut ReadBuilder {
        self.read
    }
}

impl Drop for ReadBuilderGuard<'_> {
    fn drop(&mut self) {
        let after = self.read.gapped_range();
        if after != self.before {
            self.bounds.retract(self.before);
            self.bounds.post(after);
        }
    }
}

/// Mutable contig under construction
#[derive(Debug, Clone)]
pub struct ContigBuilder {
    id: String,
    consensus: GappedSequence,
    complemented: bool,
    consensus_quality: Option<Vec<u8>>,
    quality_source: Option<SharedQualities>,
    placeholder_quality: u8,
    recall: Option<ConsensusRecall>,
    reads: Vec<ReadBuilder>,
    index: HashMap<String, usize>,
    bounds: Bounds,
    built: bool,
}

impl ContigBuilder {
    pub fn new(id: impl Into<String>, consensus: GappedSequence) -> Self {
        Self {
            id: id.into(),
            consensus,
            complemented: false,
            consensus_quality: None,
            quality_source: None,
            placeholder_quality: DEFAULT_CONSENSUS_QUALITY,
            recall: None,
            reads: Vec::new(),
            index: HashMap::new(),
            bounds: Bounds::default(),
            built: false,
        }
    }

    /// Start from an existing contig, e.g. to edit or split it
    #[must_use]
    pub fn from_contig(contig: &Contig) -> Self {
        let mut builder = Self::new(contig.id(), contig.consensus().clone());
        builder.complemented = contig.is_complemented();
        builder.consensus_quality = Some(contig.consensus_quality().to_vec());
        for read in contig.reads() {
            builder.push_read(ReadBuilder::from_read(read));
        }
        builder
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn consensus(&self) -> &GappedSequence {
        &self.consensus
    }

    #[must_use]
    pub fn is_complemented(&self) -> bool {
        self.complemented
    }

    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }

    #[must_use]
    pub fn contains_read(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn read(&self, id: &str) -> Option<&ReadBuilder> {
        self.index.get(id).map(|&i| &self.reads[i])
    }

    pub fn reads(&self) -> impl Iterator<Item = &ReadBuilder> {
        self.reads.iter()
    }

    /// Gapped span covered by the reads
    #[must_use]
    pub fn bounds(&self) -> Option<Range> {
        self.bounds.extent()
    }

    pub fn set_complemented(&mut self, complemented: bool) -> &mut Self {
        self.complemented = complemented;
        self
    }

    /// Ungapped qualities for the (untrimmed) consensus
    pub fn set_consensus_quality(&mut self, qualities: Vec<u8>) -> &mut Self {
        self.consensus_quality = Some(qualities);
        self
    }

    /// Quality used for every base when none is supplied or computed
    pub fn set_placeholder_quality(&mut self, quality: u8) -> &mut Self {
        self.placeholder_quality = quality;
        self
    }

    /// Recompute the consensus from the reads at build time
    pub fn recall_consensus(&mut self, recall: ConsensusRecall) -> &mut Self {
        self.recall = Some(recall);
        self
    }

    /// Recompute consensus qualities at build time unless qualities were
    /// supplied
    pub fn compute_consensus_quality(&mut self, qualities: SharedQualities) -> &mut Self {
        self.quality_source = Some(qualities);
        self
    }

    /// Add a read
    ///
    /// # Errors
    ///
    /// Returns `BuildError::DuplicateRead` if a read with this id exists.
    pub fn add_read(&mut self, read: ReadBuilder) -> Result<&mut Self, BuildError> {
        if self.index.contains_key(read.id()) {
            return Err(BuildError::DuplicateRead {
                contig_id: self.id.clone(),
                read_id: read.id().to_string(),
            });
        }
        self.push_read(read);
        Ok(self)
    }

    fn push_read(&mut self, read: ReadBuilder) {
        self.bounds.post(read.gapped_range());
        self.index.insert(read.id().to_string(), self.reads.len());
        self.reads.push(read);
    }

    pub fn remove_read(&mut self, id: &str) -> Option<ReadBuilder> {
        let position = self.index.remove(id)?;
        let read = self.reads.swap_remove(position);
        if let Some(moved) = self.reads.get(position) {
            self.index.insert(moved.id().to_string(), position);
        }
        self.bounds.retract(read.gapped_range());
        Some(read)
    }

    /// Edit a read in place
    pub fn read_builder(&mut self, id: &str) -> Option<ReadBuilderGuard<'_>> {
        let position = *self.index.get(id)?;
        let read = &mut self.reads[position];
        let before = read.gapped_range();
        Some(ReadBuilderGuard {
            read,
            bounds: &mut self.bounds,
            before,
        })
    }

    /// Build the contig. The builder cannot be built again.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::AlreadyBuilt` on a second call,
    /// `BuildError::QualityLengthMismatch` when supplied qualities do not
    /// fit the consensus, and `BuildError::MissingQualities` when
    /// recomputing qualities for a read the lookup does not know.
    pub fn build(&mut self) -> Result<Contig, BuildError> {
        if self.built {
            return Err(BuildError::AlreadyBuilt(self.id.clone()));
        }
        self.built = true;

        let mut reads = std::mem::take(&mut self.reads);
        self.index.clear();
        self.bounds = Bounds::default();
        let mut consensus = std::mem::take(&mut self.consensus);

        if let Some(recall) = &self.recall {
            let snapshot: Vec<AssembledRead> = reads.iter().map(ReadBuilder::build).collect();
            consensus = recall.recall(&consensus, &snapshot);
        }

        let supplied = self.consensus_quality.take();
        if let Some(qualities) = &supplied {
            if qualities.len() != consensus.ungapped_len() {
                return Err(BuildError::QualityLengthMismatch {
                    contig_id: self.id.clone(),
                    expected: consensus.ungapped_len(),
                    actual: qualities.len(),
                });
            }
        }

        let full = Range::of_length(0, consensus.len());
        reads.retain_mut(|read| {
            let span = read.gapped_range();
            if span.begin >= full.begin && span.end <= full.end && read.has_bases() {
                return true;
            }
            let kept = read.trim(&full) && read.has_bases();
            if kept {
                trace!(contig = %self.id, read = %read.id(), "Clamped read overhanging the consensus");
            } else {
                debug!(contig = %self.id, read = %read.id(), "Dropped read with no bases on the consensus");
            }
            kept
        });

        let extent = reads
            .iter()
            .map(ReadBuilder::gapped_range)
            .reduce(|a, b| a.union(&b))
            .unwrap_or(full);
        let trimmed = consensus.slice(&extent);
        let quality = supplied.map(|qualities| {
            let start = consensus.ungapped_offset(usize::try_from(extent.begin).unwrap_or(0));
            qualities[start..start + trimmed.ungapped_len()].to_vec()
        });
        for read in &mut reads {
            read.shift(-extent.begin);
        }

        reads.sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.id.cmp(&b.id)));
        let reads: Vec<AssembledRead> = reads.into_iter().map(ReadBuilder::into_read).collect();

        let consensus_quality = match (quality, &self.quality_source) {
            (Some(qualities), _) => qualities,
            (None, Some(lookup)) => ConsensusQualityComputer::new(&**lookup).compute(&trimmed, &reads)?,
            (None, None) => vec![self.placeholder_quality; trimmed.ungapped_len()],
        };

        Ok(Contig::new(
            self.id.clone(),
            trimmed,
            consensus_quality,
            self.complemented,
            reads,
        ))
    }

    /// One builder per target range holding the reads that intersect it.
    ///
    /// Each range is widened outward so it neither starts nor ends on a
    /// consensus pad, and each read is trimmed to the widened range without
    /// starting or ending on a pad of its own. Overlapping ranges give
    /// overlapping builders that share read ids. Sub-builders are named
    /// `{id}_{begin}_{end}` with 1-based coordinates.
    #[must_use]
    pub fn split(&self, ranges: &[Range]) -> Vec<ContigBuilder> {
        ranges.iter().filter_map(|range| self.split_one(range)).collect()
    }

    fn split_one(&self, range: &Range) -> Option<ContigBuilder> {
        let full = Range::of_length(0, self.consensus.len());
        let target = widen_past_pads(self.consensus.as_bytes(), range.intersection(&full)?);

        let mut sub = ContigBuilder::new(
            format!("{}_{}_{}", self.id, target.begin + 1, target.end + 1),
            self.consensus.slice(&target),
        );
        sub.complemented = self.complemented;
        sub.recall.clone_from(&self.recall);
        sub.quality_source.clone_from(&self.quality_source);
        sub.placeholder_quality = self.placeholder_quality;
        sub.consensus_quality = self.consensus_quality.as_ref().and_then(|qualities| {
            let start = self
                .consensus
                .ungapped_offset(usize::try_from(target.begin).unwrap_or(0));
            qualities
                .get(start..start + sub.consensus.ungapped_len())
                .map(<[u8]>::to_vec)
        });

        for read in &self.reads {
            let Some(overlap) = read.gapped_range().intersection(&target) else {
                continue;
            };
            let Some(overlap) = shrink_past_pads(read, overlap) else {
                continue;
            };
            let mut copy = read.clone();
            copy.trim(&overlap);
            copy.shift(-target.begin);
            sub.push_read(copy);
        }
        Some(sub)
    }
}

/// Move range ends off consensus pads, outward
fn widen_past_pads(bases: &[u8], mut range: Range) -> Range {
    let is_gap = |offset: i64| usize::try_from(offset).ok().and_then(|i| bases.get(i)) == Some(&GAP);
    while range.begin > 0 && is_gap(range.begin) {
        range.begin -= 1;
    }
    while range.end + 1 < to_i64(bases.len()) && is_gap(range.end) {
        range.end += 1;
    }
    range
}

/// Move a read's trimmed ends inward until both sit on real bases
fn shrink_past_pads(read: &ReadBuilder, mut range: Range) -> Option<Range> {
    let is_gap = |offset: i64| {
        usize::try_from(offset - read.offset())
            .ok()
            .and_then(|i| read.bases().get(i))
            .map_or(true, |b| b == GAP)
    };
    while range.begin <= range.end && is_gap(range.begin) {
        range.begin += 1;
    }
    while range.end >= range.begin && is_gap(range.end) {
        range.end -= 1;
    }
    (!range.is_empty()).then_some(range)
}
