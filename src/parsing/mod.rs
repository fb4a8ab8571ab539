//! Reading ACE files.
//!
//! - [`line`]: byte-offset aware line reader
//! - [`section`]: record classification and field parsing
//! - [`timestamp`]: `DS` and tag timestamp formats
//! - [`parser`]: the pass engine that drives a visitor
//!
//! ## Example
//!
//! ```rust,no_run
//! use ace_assembly::parsing::parser::AceFileParser;
//! use ace_assembly::visitor::collect::AssemblyCollector;
//!
//! let parser = AceFileParser::from_path("assembly.ace").unwrap();
//! let mut collector = AssemblyCollector::default();
//! parser.accept(&mut collector).unwrap();
//!
//! for contig in collector.contigs() {
//!     println!("{}: {} reads", contig.id(), contig.num_reads());
//! }
//! ```
//!
//! ## Error policy
//!
//! | Input | Outcome |
//! |-------|---------|
//! | Unknown line | ignored, or read as quality values inside `BQ` |
//! | Bad numeric field, missing `QA`, unterminated tag | `ParseError`, pass aborted |
//! | Read count differs from `CO` | `ParseError::ReadCountMismatch` at contig close |
//! | Degenerate `QA` clear range | read dropped, handler notified |

pub mod line;
pub mod parser;
pub mod section;
pub mod timestamp;

pub use parser::{AceFileParser, ParseError};
