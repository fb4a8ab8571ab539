//! Building contigs and the algorithms that run at build time.
//!
//! - [`builder`]: [`ContigBuilder`] and [`ReadBuilder`]
//! - [`consensus`]: consensus recall from the placed reads
//! - [`quality`]: consed-style consensus quality
//! - [`segment`]: base segments (`BS` records)

pub mod builder;
pub mod consensus;
pub mod quality;
pub mod segment;

pub use builder::{BuildError, ContigBuilder, ReadBuilder, ReadBuilderGuard};
pub use consensus::{ConsensusCaller, ConsensusRecall, GapQualityStrategy, MostFrequentBaseCaller, SliceElement};
pub use quality::ConsensusQualityComputer;
pub use segment::{compute_base_segments, BaseSegment};
