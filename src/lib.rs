//! # ace-assembly
//!
//! A library for reading, building and writing ACE genome assembly files,
//! the format produced by phrap and edited with consed.
//!
//! An ACE file holds contigs (a gapped consensus with per-base qualities),
//! the reads placed on each contig, and free-form tags attached to the
//! whole assembly, a consensus range or a read range. Files can be large,
//! so parsing is visitor based: callers decide per contig, read and tag
//! whether to descend, and may halt the pass or resume it later from a
//! saved position.
//!
//! ## Features
//!
//! - **Visitor parsing**: Skip what you do not need without building it
//! - **Mementos**: Resume a pass at any contig of a plain file
//! - **Contig building**: Clear-range trimming, consensus recall, consed-style consensus qualities
//! - **Stores**: In-memory, memento-indexed, or streaming access to contigs
//! - **Writing**: Round-trippable output with optional `BS` records and untrimmed reads
//!
//! ## Example
//!
//! ```rust,no_run
//! use ace_assembly::{StoreBuilder, StoreHint};
//!
//! let store = StoreBuilder::new(StoreHint::InMemory)
//!     .build_from_path("assembly.ace")
//!     .unwrap();
//!
//! for contig in store.iter().unwrap() {
//!     let contig = contig.unwrap();
//!     println!(
//!         "{}: {} bases, {} reads",
//!         contig.id(),
//!         contig.consensus().ungapped_len(),
//!         contig.num_reads()
//!     );
//! }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Contigs, reads, gapped sequences and tags
//! - [`parsing`]: The pass engine and record parsers
//! - [`visitor`]: Visitor traits, mementos and the stock visitors
//! - [`assembly`]: Contig builder, consensus recall, quality and base segments
//! - [`store`]: Contig stores
//! - [`writing`]: ACE serialization
//! - [`config`]: JSON settings
//! - [`cli`]: Command-line interface implementation

pub mod assembly;
pub mod cli;
pub mod config;
pub mod core;
pub mod parsing;
pub mod store;
pub mod visitor;
pub mod writing;

// Re-export commonly used types for convenience
pub use assembly::builder::{BuildError, ContigBuilder, ReadBuilder};
pub use config::AceConfig;
pub use core::contig::Contig;
pub use core::read::AssembledRead;
pub use core::sequence::GappedSequence;
pub use core::tag::{ConsensusTag, ReadTag, TagSet, WholeAssemblyTag};
pub use core::types::{Direction, Range};
pub use parsing::parser::{AceFileParser, ParseError};
pub use store::{AceContigStore, StoreBuilder, StoreError, StoreHint};
pub use visitor::{AceFileVisitor, Memento, ParseCallback};
pub use writing::{AceWriter, WriteError};
