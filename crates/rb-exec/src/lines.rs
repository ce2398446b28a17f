// SPDX-License-Identifier: MIT OR Apache-2.0
//! Splits a raw child-output byte stream into logical [`LogEntry`] lines.
//!
//! `\r\n` and `\n` terminate a line (`replace = false`). A bare `\r` not
//! immediately followed by `\n` marks an overwrite (`replace = true`) —
//! the common convention for progress bars and spinners. ANSI escape
//! sequences are passed through verbatim; only the line-terminator bytes
//! are consumed.

use chrono::Utc;
use rb_core::LogEntry;

/// Incremental line splitter; feed it bytes as they arrive and drain
/// completed [`LogEntry`]s after each feed.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    /// New, empty splitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes, returning every complete line it
    /// produced (zero or more).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<LogEntry> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n' || b == b'\r') else {
                break;
            };

            match self.buf[pos] {
                b'\n' => {
                    let line = take_text(&mut self.buf, pos);
                    out.push(LogEntry::line(line, Utc::now()));
                }
                b'\r' => {
                    if self.buf.get(pos + 1) == Some(&b'\n') {
                        let line = take_text(&mut self.buf, pos);
                        self.buf.drain(..1); // drop the paired \n
                        out.push(LogEntry::line(line, Utc::now()));
                    } else if pos + 1 == self.buf.len() {
                        // Might be the start of a \r\n split across reads; wait for more.
                        break;
                    } else {
                        let line = take_text(&mut self.buf, pos);
                        out.push(LogEntry::overwrite(line, Utc::now()));
                    }
                }
                _ => unreachable!(),
            }
        }

        out
    }

    /// Flush any trailing partial line once the stream has ended (the
    /// child wrote output with no final newline).
    pub fn finish(mut self) -> Option<LogEntry> {
        if self.buf.is_empty() {
            None
        } else {
            let text = String::from_utf8_lossy(&self.buf).into_owned();
            Some(LogEntry::line(text, Utc::now()))
        }
    }
}

fn take_text(buf: &mut Vec<u8>, terminator_pos: usize) -> String {
    let text = String::from_utf8_lossy(&buf[..terminator_pos]).into_owned();
    buf.drain(..=terminator_pos);
    text
}
