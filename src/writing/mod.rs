//! ACE serialization.
//!
//! [`AceWriter`] produces files the viewer and this crate's parser read
//! back: basecalls and qualities wrapped at 50 per line, case-encoded
//! consensus quality, and tags after every contig.
//!
//! ```rust,no_run
//! use ace_assembly::store::{StoreBuilder, StoreHint};
//! use ace_assembly::writing::AceWriter;
//!
//! let store = StoreBuilder::new(StoreHint::Streaming)
//!     .build_from_path("in.ace")
//!     .unwrap();
//! let mut writer = AceWriter::create("out.ace").unwrap();
//! for contig in store.iter().unwrap() {
//!     writer.write_contig(&contig.unwrap()).unwrap();
//! }
//! writer.write_tags(&store.tags().unwrap());
//! writer.finish().unwrap();
//! ```

pub mod writer;

use thiserror::Error;

use crate::assembly::builder::BuildError;

pub use writer::AceWriter;

/// Basecalls and qualities per output line
pub const LINE_WIDTH: usize = 50;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read {read_id} is {expected} bases long but its full sequence has {actual}")]
    SequenceLengthMismatch {
        read_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot compute base segments: {0}")]
    BaseSegments(#[from] BuildError),
}
