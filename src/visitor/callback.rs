use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::parsing::parser::ParseError;

/// Opaque, resumable parse position.
///
/// Only valid with the parser instance that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memento {
    parser_id: u64,
    offset: u64,
}

impl Memento {
    pub(crate) fn new(parser_id: u64, offset: u64) -> Self {
        Self { parser_id, offset }
    }

    pub(crate) fn parser_id(&self) -> u64 {
        self.parser_id
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }
}

/// Per-pass counters shared by every callback handed out during the pass
#[derive(Debug, Default)]
pub(crate) struct PassState {
    lines_consumed: AtomicU64,
}

impl PassState {
    pub(crate) fn consume_line(&self) {
        self.lines_consumed.fetch_add(1, Ordering::SeqCst);
    }

    fn lines_consumed(&self) -> u64 {
        self.lines_consumed.load(Ordering::SeqCst)
    }
}

/// Handle given to file-level visit calls.
///
/// Lets a visitor stop the pass cooperatively and, inside `visit_contig`,
/// capture a [`Memento`] for the contig being visited. The handle is cheap
/// to clone and may be kept by sub-visitors or sent to another thread.
#[derive(Debug, Clone)]
pub struct ParseCallback {
    pass: Arc<PassState>,
    halt: Arc<AtomicBool>,
    memento: Option<Memento>,
    lines_at_creation: u64,
}

impl ParseCallback {
    pub(crate) fn new(pass: Arc<PassState>, halt: Arc<AtomicBool>, memento: Option<Memento>) -> Self {
        let lines_at_creation = pass.lines_consumed();
        Self {
            pass,
            halt,
            memento,
            lines_at_creation,
        }
    }

    /// Same pass and memento, but halting flips `halt` instead
    pub(crate) fn with_halt_flag(&self, halt: Arc<AtomicBool>) -> Self {
        Self {
            pass: Arc::clone(&self.pass),
            halt,
            memento: self.memento,
            lines_at_creation: self.lines_at_creation,
        }
    }

    /// Ask the parser to stop before the next line
    pub fn halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    /// True while no line of the current contig has been consumed and the
    /// source is seekable
    #[must_use]
    pub fn can_create_memento(&self) -> bool {
        self.memento.is_some() && self.pass.lines_consumed() == self.lines_at_creation
    }

    /// Capture the position of the current contig
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MementoUnavailable` if the source is not
    /// seekable, this callback was not issued for a contig, or the contig's
    /// body has already been read.
    pub fn create_memento(&self) -> Result<Memento, ParseError> {
        let memento = self.memento.ok_or(ParseError::MementoUnavailable(
            "source is not seekable or position is not a contig",
        ))?;
        if self.pass.lines_consumed() != self.lines_at_creation {
            return Err(ParseError::MementoUnavailable(
                "contig lines have already been consumed",
            ));
        }
        Ok(memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memento_only_before_lines_consumed() {
        let pass = Arc::new(PassState::default());
        let callback = ParseCallback::new(
            Arc::clone(&pass),
            Arc::new(AtomicBool::new(false)),
            Some(Memento::new(1, 42)),
        );
        assert!(callback.can_create_memento());
        assert_eq!(callback.create_memento().unwrap().offset(), 42);

        pass.consume_line();
        assert!(!callback.can_create_memento());
        assert!(matches!(
            callback.create_memento(),
            Err(ParseError::MementoUnavailable(_))
        ));
    }

    #[test]
    fn test_no_memento_for_unseekable_sources() {
        let callback = ParseCallback::new(
            Arc::new(PassState::default()),
            Arc::new(AtomicBool::new(false)),
            None,
        );
        assert!(!callback.can_create_memento());
        assert!(callback.create_memento().is_err());
    }

    #[test]
    fn test_child_halt_flag_is_independent() {
        let root_flag = Arc::new(AtomicBool::new(false));
        let root = ParseCallback::new(Arc::new(PassState::default()), Arc::clone(&root_flag), None);
        let child = root.with_halt_flag(Arc::new(AtomicBool::new(false)));

        child.halt();
        assert!(child.is_halted());
        assert!(!root.is_halted());

        root.halt();
        assert!(root_flag.load(Ordering::SeqCst));
    }
}
