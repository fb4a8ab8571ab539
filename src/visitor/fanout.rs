//! Multiplex one pass across several visitors.
//!
//! Each delegate keeps its own skip and halt decisions. A delegate that
//! halts is retired on its own: its open sub-visitors and then the delegate
//! itself receive `halted()` at the next call on their level, and it gets no
//! further calls. The underlying pass is halted only when every delegate
//! has halted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::tag::{ConsensusTagHeader, ReadTag, WholeAssemblyTag};
use crate::core::types::{Direction, Range};
use crate::parsing::parser::ParseError;
use crate::parsing::section::{ContigHeader, FileHeader, QualityClip, ReadHeader, TraceDescription};
use crate::visitor::{
    AceConsensusTagVisitor, AceContigVisitor, AceFileVisitor, AceReadVisitor, ConsensusTagVisit,
    ContigVisit, ParseCallback, ReadVisit, VisitDecision,
};

/// Delivers the `halted()` notification for any visitor level
trait NotifyHalted {
    fn notify_halted(&mut self);
}

impl NotifyHalted for &mut dyn AceFileVisitor {
    fn notify_halted(&mut self) {
        self.halted();
    }
}

impl NotifyHalted for Box<dyn AceContigVisitor + '_> {
    fn notify_halted(&mut self) {
        self.halted();
    }
}

impl NotifyHalted for Box<dyn AceReadVisitor + '_> {
    fn notify_halted(&mut self) {
        self.halted();
    }
}

impl NotifyHalted for Box<dyn AceConsensusTagVisitor + '_> {
    fn notify_halted(&mut self) {
        self.halted();
    }
}

struct Lane<V> {
    visitor: V,
    halt: Arc<AtomicBool>,
    retired: bool,
}

impl<V> Lane<V> {
    fn new(visitor: V, halt: Arc<AtomicBool>) -> Self {
        Self {
            visitor,
            halt,
            retired: false,
        }
    }

    fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    fn is_live(&self) -> bool {
        !self.retired && !self.is_halted()
    }
}

/// Open visitors of one level
struct Lanes<V> {
    lanes: Vec<Lane<V>>,
}

impl<V: NotifyHalted> Lanes<V> {
    fn new(lanes: Vec<Lane<V>>) -> Self {
        Self { lanes }
    }

    /// Send `halted()` to lanes whose delegate halted since the last call
    fn retire_halted(&mut self) {
        for lane in &mut self.lanes {
            if !lane.retired && lane.is_halted() {
                lane.visitor.notify_halted();
                lane.retired = true;
            }
        }
    }

    fn live_mut(&mut self) -> impl Iterator<Item = &mut Lane<V>> + '_ {
        self.lanes.iter_mut().filter(|lane| lane.is_live())
    }

    fn forward(
        &mut self,
        mut call: impl FnMut(&mut V) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        self.retire_halted();
        for lane in self.live_mut() {
            call(&mut lane.visitor)?;
        }
        Ok(())
    }

    /// The pass was halted: every lane still open is told so
    fn halt_open(&mut self) {
        for lane in &mut self.lanes {
            if !lane.retired {
                lane.visitor.notify_halted();
                lane.retired = true;
            }
        }
    }
}

/// Halts the pass once every delegate has halted
#[derive(Clone)]
struct Halting {
    parent: ParseCallback,
    flags: Vec<Arc<AtomicBool>>,
}

impl Halting {
    fn propagate(&self) {
        if self.flags.iter().all(|flag| flag.load(Ordering::SeqCst)) {
            self.parent.halt();
        }
    }
}

/// File visitor that forwards every call to several delegates
pub struct FanoutVisitor<'d> {
    lanes: Lanes<&'d mut dyn AceFileVisitor>,
}

impl<'d> FanoutVisitor<'d> {
    #[must_use]
    pub fn new(delegates: Vec<&'d mut dyn AceFileVisitor>) -> Self {
        let lanes = delegates
            .into_iter()
            .map(|visitor| Lane::new(visitor, Arc::new(AtomicBool::new(false))))
            .collect();
        Self {
            lanes: Lanes::new(lanes),
        }
    }

    #[must_use]
    pub fn num_delegates(&self) -> usize {
        self.lanes.lanes.len()
    }

    /// Number of delegates that have not halted
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.lanes.lanes.iter().filter(|lane| lane.is_live()).count()
    }

    fn halting(&self, parent: &ParseCallback) -> Halting {
        Halting {
            parent: parent.clone(),
            flags: self.lanes.lanes.iter().map(|lane| Arc::clone(&lane.halt)).collect(),
        }
    }
}

impl AceFileVisitor for FanoutVisitor<'_> {
    fn visit_header(&mut self, header: &FileHeader) -> Result<(), ParseError> {
        self.lanes.forward(|visitor| visitor.visit_header(header))
    }

    fn visit_contig(
        &mut self,
        callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        self.lanes.retire_halted();
        let halting = self.halting(callback);

        let mut children = Vec::new();
        for lane in self.lanes.live_mut() {
            let child = callback.with_halt_flag(Arc::clone(&lane.halt));
            if let VisitDecision::Visit(visitor) = lane.visitor.visit_contig(&child, header)? {
                children.push(Lane::new(visitor, Arc::clone(&lane.halt)));
            }
        }
        halting.propagate();

        if children.is_empty() {
            return Ok(VisitDecision::Skip);
        }
        Ok(VisitDecision::Visit(Box::new(FanoutContig {
            lanes: Lanes::new(children),
            halting,
        })))
    }

    fn visit_read_tag(&mut self, callback: &ParseCallback, tag: ReadTag) -> Result<(), ParseError> {
        self.lanes.retire_halted();
        let halting = self.halting(callback);
        for lane in self.lanes.live_mut() {
            let child = callback.with_halt_flag(Arc::clone(&lane.halt));
            lane.visitor.visit_read_tag(&child, tag.clone())?;
        }
        halting.propagate();
        Ok(())
    }

    fn visit_consensus_tag(
        &mut self,
        callback: &ParseCallback,
        header: &ConsensusTagHeader,
    ) -> Result<ConsensusTagVisit<'_>, ParseError> {
        self.lanes.retire_halted();
        let halting = self.halting(callback);

        let mut children = Vec::new();
        for lane in self.lanes.live_mut() {
            let child = callback.with_halt_flag(Arc::clone(&lane.halt));
            if let VisitDecision::Visit(visitor) = lane.visitor.visit_consensus_tag(&child, header)? {
                children.push(Lane::new(visitor, Arc::clone(&lane.halt)));
            }
        }
        halting.propagate();

        if children.is_empty() {
            return Ok(VisitDecision::Skip);
        }
        Ok(VisitDecision::Visit(Box::new(FanoutConsensusTag {
            lanes: Lanes::new(children),
            halting,
        })))
    }

    fn visit_whole_assembly_tag(
        &mut self,
        callback: &ParseCallback,
        tag: WholeAssemblyTag,
    ) -> Result<(), ParseError> {
        self.lanes.retire_halted();
        let halting = self.halting(callback);
        for lane in self.lanes.live_mut() {
            let child = callback.with_halt_flag(Arc::clone(&lane.halt));
            lane.visitor.visit_whole_assembly_tag(&child, tag.clone())?;
        }
        halting.propagate();
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        self.lanes.forward(|visitor| visitor.visit_end())
    }

    fn halted(&mut self) {
        self.lanes.halt_open();
    }
}

struct FanoutContig<'a> {
    lanes: Lanes<Box<dyn AceContigVisitor + 'a>>,
    halting: Halting,
}

impl<'a> FanoutContig<'a> {
    fn forward(
        &mut self,
        call: impl FnMut(&mut Box<dyn AceContigVisitor + 'a>) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        self.lanes.forward(call)?;
        self.halting.propagate();
        Ok(())
    }
}

impl AceContigVisitor for FanoutContig<'_> {
    fn visit_bases_line(&mut self, bases: &str) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_bases_line(bases))
    }

    fn visit_consensus_qualities(&mut self, qualities: &[u8]) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_consensus_qualities(qualities))
    }

    fn visit_aligned_read_info(
        &mut self,
        read_id: &str,
        direction: Direction,
        gapped_start: i64,
    ) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_aligned_read_info(read_id, direction, gapped_start))
    }

    fn visit_base_segment(&mut self, range: Range, read_id: &str) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_base_segment(range, read_id))
    }

    fn visit_begin_read(&mut self, header: &ReadHeader) -> Result<ReadVisit<'_>, ParseError> {
        self.lanes.retire_halted();

        let mut children = Vec::new();
        for lane in self.lanes.live_mut() {
            if let VisitDecision::Visit(visitor) = lane.visitor.visit_begin_read(header)? {
                children.push(Lane::new(visitor, Arc::clone(&lane.halt)));
            }
        }
        self.halting.propagate();

        if children.is_empty() {
            return Ok(VisitDecision::Skip);
        }
        Ok(VisitDecision::Visit(Box::new(FanoutRead {
            lanes: Lanes::new(children),
            halting: self.halting.clone(),
        })))
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_end())
    }

    fn halted(&mut self) {
        self.lanes.halt_open();
    }
}

struct FanoutRead<'a> {
    lanes: Lanes<Box<dyn AceReadVisitor + 'a>>,
    halting: Halting,
}

impl<'a> FanoutRead<'a> {
    fn forward(
        &mut self,
        call: impl FnMut(&mut Box<dyn AceReadVisitor + 'a>) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        self.lanes.forward(call)?;
        self.halting.propagate();
        Ok(())
    }
}

impl AceReadVisitor for FanoutRead<'_> {
    fn visit_quality_line(&mut self, clip: QualityClip) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_quality_line(clip))
    }

    fn visit_trace_description(&mut self, description: &TraceDescription) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_trace_description(description))
    }

    fn visit_bases_line(&mut self, bases: &str) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_bases_line(bases))
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_end())
    }

    fn halted(&mut self) {
        self.lanes.halt_open();
    }
}

struct FanoutConsensusTag<'a> {
    lanes: Lanes<Box<dyn AceConsensusTagVisitor + 'a>>,
    halting: Halting,
}

impl<'a> FanoutConsensusTag<'a> {
    fn forward(
        &mut self,
        call: impl FnMut(&mut Box<dyn AceConsensusTagVisitor + 'a>) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        self.lanes.forward(call)?;
        self.halting.propagate();
        Ok(())
    }
}

impl AceConsensusTagVisitor for FanoutConsensusTag<'_> {
    fn visit_data(&mut self, line: &str) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_data(line))
    }

    fn visit_comment(&mut self, comment: &str) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_comment(comment))
    }

    fn visit_end(&mut self) -> Result<(), ParseError> {
        self.forward(|visitor| visitor.visit_end())
    }

    fn halted(&mut self) {
        self.lanes.halt_open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parser::AceFileParser;
    use std::io::Cursor;

    const THREE_CONTIGS: &str = "AS 3 3

CO ctg1 4 1 0 U
ACGT

BQ
 30 30 30 30

AF r1 U 1

RD r1 4 0 0
ACGT

QA 1 4 1 4

CO ctg2 4 1 0 U
ACGA

BQ
 30 30 30 30

AF r2 U 1

RD r2 4 0 0
ACGA

QA 1 4 1 4

CO ctg3 4 1 0 U
ACGC

BQ
 30 30 30 30

AF r3 U 1

RD r3 4 0 0
ACGC

QA 1 4 1 4
";

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        halt_at: Option<&'static str>,
        skip: Option<&'static str>,
    }

    struct ContigLog<'a>(&'a mut Vec<String>);
    struct ReadLog<'a>(&'a mut Vec<String>);

    impl AceFileVisitor for Recorder {
        fn visit_header(&mut self, _header: &FileHeader) -> Result<(), ParseError> {
            self.events.push("header".to_string());
            Ok(())
        }

        fn visit_contig(
            &mut self,
            callback: &ParseCallback,
            header: &ContigHeader,
        ) -> Result<ContigVisit<'_>, ParseError> {
            self.events.push(format!("contig {}", header.id));
            if self.halt_at == Some(header.id.as_str()) {
                callback.halt();
            }
            if self.skip == Some(header.id.as_str()) {
                return Ok(VisitDecision::Skip);
            }
            Ok(VisitDecision::Visit(Box::new(ContigLog(&mut self.events))))
        }

        fn visit_end(&mut self) -> Result<(), ParseError> {
            self.events.push("end".to_string());
            Ok(())
        }

        fn halted(&mut self) {
            self.events.push("halted".to_string());
        }
    }

    impl AceContigVisitor for ContigLog<'_> {
        fn visit_bases_line(&mut self, bases: &str) -> Result<(), ParseError> {
            self.0.push(format!("bases {bases}"));
            Ok(())
        }

        fn visit_begin_read(&mut self, header: &ReadHeader) -> Result<ReadVisit<'_>, ParseError> {
            self.0.push(format!("read {}", header.read_id));
            Ok(VisitDecision::Visit(Box::new(ReadLog(&mut *self.0))))
        }

        fn visit_end(&mut self) -> Result<(), ParseError> {
            self.0.push("contig end".to_string());
            Ok(())
        }

        fn halted(&mut self) {
            self.0.push("contig halted".to_string());
        }
    }

    impl AceReadVisitor for ReadLog<'_> {
        fn visit_quality_line(&mut self, _clip: QualityClip) -> Result<(), ParseError> {
            self.0.push("qa".to_string());
            Ok(())
        }

        fn halted(&mut self) {
            self.0.push("read halted".to_string());
        }
    }

    fn run(delegates: Vec<&mut dyn AceFileVisitor>) {
        let parser = AceFileParser::from_reader(Cursor::new(THREE_CONTIGS.to_string()));
        let mut fanout = FanoutVisitor::new(delegates);
        parser.accept(&mut fanout).unwrap();
    }

    #[test]
    fn test_halted_delegate_retires_alone() {
        let mut halting = Recorder {
            halt_at: Some("ctg2"),
            ..Recorder::default()
        };
        let mut full = Recorder::default();
        run(vec![&mut halting, &mut full]);

        let tail: Vec<&str> = halting.events.iter().map(String::as_str).skip_while(|e| *e != "contig ctg2").collect();
        assert_eq!(tail, vec!["contig ctg2", "contig halted", "halted"]);

        assert!(full.events.contains(&"contig ctg3".to_string()));
        assert!(full.events.contains(&"bases ACGC".to_string()));
        assert_eq!(full.events.last().map(String::as_str), Some("end"));
        assert!(!full.events.iter().any(|e| e.contains("halted")));
    }

    #[test]
    fn test_skip_is_per_delegate() {
        let mut skipper = Recorder {
            skip: Some("ctg1"),
            ..Recorder::default()
        };
        let mut full = Recorder::default();
        run(vec![&mut skipper, &mut full]);

        assert!(!skipper.events.contains(&"bases ACGT".to_string()));
        assert!(!skipper.events.contains(&"read r1".to_string()));
        assert!(skipper.events.contains(&"read r2".to_string()));
        assert!(full.events.contains(&"bases ACGT".to_string()));
        assert!(full.events.contains(&"read r1".to_string()));
    }

    #[test]
    fn test_pass_halts_when_every_delegate_halted() {
        let mut first = Recorder {
            halt_at: Some("ctg1"),
            ..Recorder::default()
        };
        let mut second = Recorder {
            halt_at: Some("ctg2"),
            ..Recorder::default()
        };
        run(vec![&mut first, &mut second]);

        assert_eq!(first.events, vec!["header", "contig ctg1", "contig halted", "halted"]);
        assert!(!second.events.contains(&"contig ctg3".to_string()));
        assert_eq!(second.events.last().map(String::as_str), Some("halted"));
        assert!(!second.events.contains(&"end".to_string()));
    }

    #[test]
    fn test_single_delegate_behaves_like_direct_visit() {
        let mut direct = Recorder::default();
        AceFileParser::from_reader(Cursor::new(THREE_CONTIGS.to_string()))
            .accept(&mut direct)
            .unwrap();

        let mut through = Recorder::default();
        run(vec![&mut through]);
        assert_eq!(direct.events, through.events);
    }
}
