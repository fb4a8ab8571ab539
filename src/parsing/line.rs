//! Line reader that tracks byte offsets, so parse positions can be resumed.

use std::io::{self, BufRead};

/// One line of input with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line content without the trailing `\n` / `\r\n`
    pub text: String,
    /// Byte offset of the first byte of the line
    pub offset: u64,
    /// 1-based line number within the pass
    pub number: u64,
}

/// Sequential reader over a byte stream
pub struct LineSource<R> {
    reader: R,
    offset: u64,
    number: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> LineSource<R> {
    /// Start reading at `offset`, which must be where `reader` is positioned
    pub fn new(reader: R, offset: u64) -> Self {
        Self {
            reader,
            offset,
            number: 0,
            buf: Vec::with_capacity(128),
        }
    }

    /// Byte offset of the next line
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next line, `None` at end of input
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying reader.
    pub fn next_line(&mut self) -> io::Result<Option<Line>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }

        let start = self.offset;
        self.offset += read as u64;
        self.number += 1;

        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }

        Ok(Some(Line {
            text: String::from_utf8_lossy(&self.buf[..end]).into_owned(),
            offset: start,
            number: self.number,
        }))
    }
}
