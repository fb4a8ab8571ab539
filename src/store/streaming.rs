//! Store that caches nothing and streams contigs from a worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use super::{accepts, AceContigStore, AssemblyIndex, ContigIter, SingleContig, StoreError};
use crate::core::contig::Contig;
use crate::core::tag::{ConsensusTag, ReadTag, WholeAssemblyTag};
use crate::parsing::parser::{AceFileParser, ParseError};
use crate::parsing::section::ContigHeader;
use crate::visitor::collect::{BuildOptions, ContigBuilderVisitor, ContigFilter};
use crate::visitor::{AceFileVisitor, ContigVisit, ParseCallback, VisitDecision};

/// Store re-parsing the source for every call.
///
/// `iter` runs the pass on a worker thread that hands built contigs over a
/// bounded channel. The worker blocks while the channel is full. The
/// stream owns the pass's halt flag, so dropping the iterator stops the
/// worker before its next line, even in the middle of a contig.
pub struct StreamingStore {
    parser: Arc<AceFileParser>,
    options: BuildOptions,
    filter: Option<ContigFilter>,
    channel_capacity: usize,
    closed: bool,
}

impl std::fmt::Debug for StreamingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingStore")
            .field("parser", &self.parser)
            .field("channel_capacity", &self.channel_capacity)
            .field("closed", &self.closed)
            .finish()
    }
}

impl StreamingStore {
    #[must_use]
    pub fn new(
        parser: AceFileParser,
        options: BuildOptions,
        filter: Option<ContigFilter>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            parser: Arc::new(parser),
            options,
            filter,
            channel_capacity: channel_capacity.max(1),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn scan(&self) -> Result<AssemblyIndex, StoreError> {
        self.check_open()?;
        Ok(AssemblyIndex::scan(&self.parser, self.filter.clone(), false)?)
    }

    /// Start a worker pass and return the consuming end
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Closed` after `close`.
    pub fn stream(&self) -> Result<ContigStream, StoreError> {
        self.check_open()?;
        let (tx, rx) = bounded(self.channel_capacity);
        let halt = Arc::new(AtomicBool::new(false));

        let parser = Arc::clone(&self.parser);
        let mut worker = ChannelVisitor {
            tx,
            options: self.options.clone(),
            filter: self.filter.clone(),
        };
        let pass_halt = Arc::clone(&halt);
        let handle = thread::spawn(move || {
            if let Err(e) = parser.accept_with_halt(&mut worker, pass_halt) {
                // the consumer may already be gone
                let _ = worker.tx.send(Err(StoreError::Parse(e)));
            }
        });
        debug!(capacity = self.channel_capacity, "Started streaming worker");

        Ok(ContigStream {
            rx: Some(rx),
            halt,
            handle: Some(handle),
        })
    }
}

impl AceContigStore for StreamingStore {
    fn get(&self, id: &str) -> Result<Option<Contig>, StoreError> {
        self.check_open()?;
        if !accepts(self.filter.as_ref(), id) {
            return Ok(None);
        }
        let mut visitor = SingleContig::new(id, &self.options);
        self.parser.accept(&mut visitor)?;
        Ok(visitor.found)
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.scan()?.entry(id).is_some())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.scan()?.ids())
    }

    fn num_contigs(&self) -> Result<usize, StoreError> {
        Ok(self.scan()?.entries.len())
    }

    fn num_reads(&self) -> Result<u64, StoreError> {
        Ok(self.scan()?.num_reads())
    }

    fn iter(&self) -> Result<ContigIter<'_>, StoreError> {
        Ok(Box::new(self.stream()?))
    }

    fn whole_assembly_tags(&self) -> Result<Vec<WholeAssemblyTag>, StoreError> {
        Ok(self.scan()?.tags.whole_assembly)
    }

    fn consensus_tags(&self) -> Result<Vec<ConsensusTag>, StoreError> {
        Ok(self.scan()?.tags.consensus)
    }

    fn read_tags(&self) -> Result<Vec<ReadTag>, StoreError> {
        Ok(self.scan()?.tags.read)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Worker side: builds contigs and pushes them into the channel
struct ChannelVisitor {
    tx: Sender<Result<Contig, StoreError>>,
    options: BuildOptions,
    filter: Option<ContigFilter>,
}

impl AceFileVisitor for ChannelVisitor {
    fn visit_contig(
        &mut self,
        callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        if !accepts(self.filter.as_ref(), &header.id) {
            return Ok(VisitDecision::Skip);
        }
        let tx = &self.tx;
        let callback = callback.clone();
        Ok(VisitDecision::Visit(Box::new(ContigBuilderVisitor::new(
            header,
            &self.options,
            move |contig| {
                if tx.send(Ok(contig)).is_err() {
                    callback.halt();
                }
                Ok(())
            },
        ))))
    }

    fn halted(&mut self) {
        debug!("Streaming worker halted");
    }
}

/// Consuming end of a streaming pass.
///
/// Yields contigs in file order; a parse error is yielded once and ends the
/// stream. Dropping the stream halts the worker's pass and waits for it.
pub struct ContigStream {
    rx: Option<Receiver<Result<Contig, StoreError>>>,
    halt: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for ContigStream {
    type Item = Result<Contig, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(item) => {
                if item.is_err() {
                    self.rx = None;
                }
                Some(item)
            }
            Err(_) => {
                self.rx = None;
                let panicked = self.handle.take().map_or(false, |h| h.join().is_err());
                panicked.then_some(Err(StoreError::WorkerFailed))
            }
        }
    }
}

impl Drop for ContigStream {
    fn drop(&mut self) {
        self.halt.store(true, Ordering::SeqCst);
        // unblocks a worker waiting on a full channel
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Streaming worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_data::{write_ace, THREE_CONTIGS};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn store(capacity: usize) -> (tempfile::TempDir, StreamingStore) {
        let dir = tempfile::tempdir().unwrap();
        let parser = AceFileParser::from_path(write_ace(&dir)).unwrap();
        (dir, StreamingStore::new(parser, BuildOptions::default(), None, capacity))
    }

    #[test]
    fn test_stream_in_file_order() {
        let (_dir, store) = store(1);
        let ids: Vec<String> = store
            .stream()
            .unwrap()
            .map(|c| c.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["ctg1", "ctg2", "other"]);
    }

    #[test]
    fn test_dropping_stream_stops_worker() {
        let (_dir, store) = store(1);
        let mut stream = store.stream().unwrap();
        assert_eq!(stream.next().unwrap().unwrap().id(), "ctg1");
        drop(stream);
        // a fresh pass still sees everything
        assert_eq!(store.iter().unwrap().count(), 3);
    }

    /// A one-read contig followed by a contig of `reads` reads that are all
    /// clipped away
    fn large_assembly(reads: usize) -> String {
        use std::fmt::Write;

        let mut text = format!(
            "AS 2 {}\n\nCO small 4 1 1 U\nACGT\n\nBQ\n 40 40 40 40\n\nAF s1 U 1\nBS 1 4 s1\n\n\
             RD s1 4 0 0\nACGT\n\nQA 1 4 1 4\n\nCO large 4 {reads} 0 U\nACGT\n\nBQ\n 40 40 40 40\n\n",
            reads + 1
        );
        for i in 0..reads {
            let _ = writeln!(text, "AF x{i} U 1");
        }
        text.push('\n');
        for i in 0..reads {
            let _ = write!(text, "RD x{i} 4 0 0\nACGT\n\nQA -1 -1 1 4\n\n");
        }
        text
    }

    #[test]
    fn test_drop_halts_worker_inside_contig() {
        let reads = 200_000;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.ace");
        std::fs::write(&path, large_assembly(reads)).unwrap();

        let dropped = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dropped);
        let options = BuildOptions::default().with_invalid_read_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let store = StreamingStore::new(AceFileParser::from_path(&path).unwrap(), options, None, 1);

        let mut stream = store.stream().unwrap();
        assert_eq!(stream.next().unwrap().unwrap().id(), "small");
        let start = Instant::now();
        drop(stream);
        let elapsed = start.elapsed();

        assert!(dropped.load(Ordering::SeqCst) < reads);
        assert!(elapsed < Duration::from_millis(250), "drop took {elapsed:?}");
    }

    #[test]
    fn test_parse_error_ends_stream() {
        let broken = THREE_CONTIGS.replace("CO ctg2 5 2 2 U", "CO ctg2 5 x 2 U");
        let parser = AceFileParser::from_reader(Cursor::new(broken));
        let store = StreamingStore::new(parser, BuildOptions::default(), None, 2);
        let items: Vec<Result<Contig, StoreError>> = store.stream().unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(StoreError::Parse(ParseError::Malformed { .. }))));
    }

    #[test]
    fn test_single_use_source() {
        let parser = AceFileParser::from_reader(Cursor::new(THREE_CONTIGS.to_string()));
        let store = StreamingStore::new(parser, BuildOptions::default(), None, 2);
        assert_eq!(store.iter().unwrap().count(), 3);
        assert!(matches!(
            store.num_contigs(),
            Err(StoreError::Parse(ParseError::SourceConsumed))
        ));
    }
}
