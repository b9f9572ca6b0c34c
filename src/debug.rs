//! Debug line publisher
//!
//! Render-thread diagnostics cannot go through a global logger — they are
//! formatted into a fixed scratch line and framed into the DBG ring, where
//! the control thread's debug reader drains them. Lines are UTF-8 text
//! terminated with a newline; formatting past the line capacity truncates
//! silently.

use std::fmt::{self, Write as _};

use crate::ring::RingWriter;

/// Fixed capacity of one formatted debug line, newline included
pub const LINE_CAPACITY: usize = 1024;

/// Fixed-capacity line buffer implementing `fmt::Write`
pub struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Append a trailing newline if there is room for it
    pub fn terminate(&mut self) {
        if self.len < LINE_CAPACITY {
            self.buf[self.len] = b'\n';
            self.len += 1;
        } else {
            self.buf[LINE_CAPACITY - 1] = b'\n';
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = LINE_CAPACITY - self.len;
        let take = s.len().min(remaining);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Format one line and publish it to the given (DBG) ring writer.
/// Returns false if the ring was full and the line dropped.
pub fn publish_line(writer: &RingWriter<'_>, args: fmt::Arguments<'_>) -> bool {
    let mut line = LineBuffer::new();
    let _ = line.write_fmt(args);
    line.terminate();
    writer.write(line.as_bytes())
}

/// Publish a pre-formatted byte line, appending the newline
pub fn publish_raw(writer: &RingWriter<'_>, bytes: &[u8]) -> bool {
    let mut line = LineBuffer::new();
    let take = bytes.len().min(LINE_CAPACITY - 1);
    line.buf[..take].copy_from_slice(&bytes[..take]);
    line.len = take;
    line.terminate();
    writer.write(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::{RingId, SharedRegion};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_formats_and_terminates() {
        let mut line = LineBuffer::new();
        let _ = write!(line, "late bundle: {}ms", 5);
        line.terminate();
        assert_eq!(line.as_bytes(), b"late bundle: 5ms\n");
    }

    #[test]
    fn test_truncation_is_silent() {
        let mut line = LineBuffer::new();
        let long = "x".repeat(LINE_CAPACITY * 2);
        let _ = write!(line, "{}", long);
        line.terminate();
        assert_eq!(line.as_bytes().len(), LINE_CAPACITY);
        assert_eq!(line.as_bytes()[LINE_CAPACITY - 1], b'\n');
    }

    #[test]
    fn test_publishes_to_dbg_ring() {
        let region = SharedRegion::new().unwrap();
        let writer = RingWriter::new(&region, RingId::Debug);
        assert!(publish_line(&writer, format_args!("boot: {}Hz", 48_000)));
        assert!(region.control().dbg_head.load(Ordering::Relaxed) > 0);
    }
}
