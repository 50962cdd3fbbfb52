//! Line reassembly across chunk boundaries
//!
//! Chunks from the input source never align with line breaks. The
//! reassembler folds them into complete `\n`-terminated lines and holds back
//! the trailing open line until either a later chunk terminates it or the
//! source is exhausted and [`LineReassembler::flush`] is called.
//!
//! Bytes are accumulated before decoding, so a multi-byte UTF-8 sequence cut
//! by a chunk boundary is decoded intact once its line completes.

/// Incremental line reassembler
///
/// Exactly one line is open at any time. It is never returned by
/// [`feed`](Self::feed): a truncated record would corrupt extraction.
#[derive(Debug, Default)]
pub struct LineReassembler {
    open: Vec<u8>,
    lines_emitted: u64,
}

impl LineReassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a chunk into the open line and return every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.open.extend_from_slice(&rest[..pos]);
            lines.push(self.close_open());
            rest = &rest[pos + 1..];
        }

        self.open.extend_from_slice(rest);
        lines
    }

    /// Close the open line at end of stream
    ///
    /// Returns `None` when nothing is pending, including on repeated calls.
    pub fn flush(&mut self) -> Option<String> {
        if self.open.is_empty() {
            return None;
        }
        Some(self.close_open())
    }

    /// Bytes held in the open line
    pub fn pending_len(&self) -> usize {
        self.open.len()
    }

    /// Total lines completed so far, including flushed ones
    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    fn close_open(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.open);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        self.lines_emitted += 1;
        match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}
