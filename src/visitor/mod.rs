//! Push-based visitor protocol for ACE files.
//!
//! The parser walks the file once and calls into a layered set of visitors:
//!
//! ```text
//! AceFileVisitor
//! ├── visit_contig ──────────► AceContigVisitor
//! │                            └── visit_begin_read ──► AceReadVisitor
//! ├── visit_consensus_tag ───► AceConsensusTagVisitor
//! ├── visit_read_tag
//! └── visit_whole_assembly_tag
//! ```
//!
//! Every method has a no-op default, so a visitor only implements what it
//! needs. Methods that open a sub-visitor return a [`VisitDecision`]; `Skip`
//! prunes that part of the file without any further calls. Sub-visitors
//! borrow their parent, so they are dropped before the parent is called
//! again.
//!
//! ## Halting
//!
//! File-level calls receive a [`ParseCallback`]. After `halt()` the parser
//! stops before the next line and calls `halted()` on every open visitor,
//! innermost first. No other call is made after that.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ace_assembly::parsing::parser::{AceFileParser, ParseError};
//! use ace_assembly::parsing::section::ContigHeader;
//! use ace_assembly::visitor::{AceContigVisitor, AceFileVisitor, ParseCallback, VisitDecision};
//!
//! #[derive(Default)]
//! struct ContigNames(Vec<String>);
//!
//! impl AceFileVisitor for ContigNames {
//!     fn visit_contig(
//!         &mut self,
//!         _callback: &ParseCallback,
//!         header: &ContigHeader,
//!     ) -> Result<VisitDecision<Box<dyn AceContigVisitor + '_>>, ParseError> {
//!         self.0.push(header.id.clone());
//!         Ok(VisitDecision::Skip)
//!     }
//! }
//!
//! let parser = AceFileParser::from_path("assembly.ace").unwrap();
//! let mut names = ContigNames::default();
//! parser.accept(&mut names).unwrap();
//! ```

pub mod callback;
pub mod collect;
pub mod fanout;

pub use callback::{Memento, ParseCallback};

use crate::core::tag::{ConsensusTagHeader, ReadTag, WholeAssemblyTag};
use crate::core::types::{Direction, Range};
use crate::parsing::parser::ParseError;
use crate::parsing::section::{ContigHeader, FileHeader, QualityClip, ReadHeader, TraceDescription};

/// Whether to descend into a part of the file
pub enum VisitDecision<V> {
    Skip,
    Visit(V),
}

impl<V> VisitDecision<V> {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    pub fn into_visitor(self) -> Option<V> {
        match self {
            Self::Skip => None,
            Self::Visit(v) => Some(v),
        }
    }
}

impl<V> std::fmt::Debug for VisitDecision<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "Skip"),
            Self::Visit(_) => write!(f, "Visit(..)"),
        }
    }
}

pub type ContigVisit<'a> = VisitDecision<Box<dyn AceContigVisitor + 'a>>;
pub type ReadVisit<'a> = VisitDecision<Box<dyn AceReadVisitor + 'a>>;
pub type ConsensusTagVisit<'a> = VisitDecision<Box<dyn AceConsensusTagVisitor + 'a>>;

/// Top-level visitor for one pass over a file
pub trait AceFileVisitor {
    /// `AS` line. Not called when resuming from a memento.
    fn visit_header(&mut self, _header: &FileHeader) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_contig(
        &mut self,
        _callback: &ParseCallback,
        _header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        Ok(VisitDecision::Skip)
    }

    fn visit_read_tag(&mut self, _callback: &ParseCallback, _tag: ReadTag) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_consensus_tag(
        &mut self,
        _callback: &ParseCallback,
        _header: &ConsensusTagHeader,
    ) -> Result<ConsensusTagVisit<'_>, ParseError> {
        Ok(VisitDecision::Skip)
    }

    fn visit_whole_assembly_tag(
        &mut self,
        _callback: &ParseCallback,
        _tag: WholeAssemblyTag,
    ) -> Result<(), ParseError> {
        Ok(())
    }

    /// The whole input was consumed
    fn visit_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    /// The pass was halted
    fn halted(&mut self) {}
}

/// Visitor for the records of one contig
pub trait AceContigVisitor {
    /// One line of gapped, mixed-case consensus basecalls
    fn visit_bases_line(&mut self, _bases: &str) -> Result<(), ParseError> {
        Ok(())
    }

    /// The complete `BQ` block, one value per ungapped consensus base
    fn visit_consensus_qualities(&mut self, _qualities: &[u8]) -> Result<(), ParseError> {
        Ok(())
    }

    /// `AF` record; `gapped_start` is 0-based
    fn visit_aligned_read_info(
        &mut self,
        _read_id: &str,
        _direction: Direction,
        _gapped_start: i64,
    ) -> Result<(), ParseError> {
        Ok(())
    }

    /// `BS` record
    fn visit_base_segment(&mut self, _range: Range, _read_id: &str) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_begin_read(&mut self, _header: &ReadHeader) -> Result<ReadVisit<'_>, ParseError> {
        Ok(VisitDecision::Skip)
    }

    /// The contig was closed by the next contig, a tag, or end of input
    fn visit_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn halted(&mut self) {}
}

/// Visitor for the records of one read
pub trait AceReadVisitor {
    fn visit_quality_line(&mut self, _clip: QualityClip) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_trace_description(&mut self, _description: &TraceDescription) -> Result<(), ParseError> {
        Ok(())
    }

    /// One line of gapped, mixed-case read basecalls
    fn visit_bases_line(&mut self, _bases: &str) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn halted(&mut self) {}
}

/// Visitor for the body of a `CT{}` block
pub trait AceConsensusTagVisitor {
    fn visit_data(&mut self, _line: &str) -> Result<(), ParseError> {
        Ok(())
    }

    /// One complete `COMMENT{ ... C}` sub-block
    fn visit_comment(&mut self, _comment: &str) -> Result<(), ParseError> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn halted(&mut self) {}
}
