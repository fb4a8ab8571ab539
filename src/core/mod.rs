//! Core data types for ACE assemblies.
//!
//! - [`Contig`]: gapped consensus, consensus qualities and placed reads
//! - [`AssembledRead`]: a read's valid bases and where they sit on the consensus
//! - [`GappedSequence`]: bases with `*` pads and gapped/ungapped offset conversion
//! - Tags: [`WholeAssemblyTag`], [`ConsensusTag`], [`ReadTag`]
//! - Lookups into trace data kept outside the ACE file
//!
//! ## Coordinates
//!
//! ACE files use 1-based inclusive coordinates. Everything in this crate is
//! 0-based inclusive ([`Range`]); the parser and writer convert at the edge.

pub mod contig;
pub mod lookup;
pub mod read;
pub mod sequence;
pub mod tag;
pub mod types;

pub use contig::{Contig, ContigSummary};
pub use read::{AssembledRead, TraceInfo};
pub use sequence::GappedSequence;
pub use tag::{ConsensusTag, ConsensusTagHeader, ReadTag, TagSet, WholeAssemblyTag};
pub use types::{Direction, Range};
