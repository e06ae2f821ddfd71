//! Frame decoding for Server-Sent Events (SSE) byte streams.
//!
//! The Responses endpoint streams records that look like:
//!
//! ```text
//! event: response.output_text.delta
//! data: {"type":"response.output_text.delta","item_id":"msg_1","delta":"Hel"}
//!
//! data: {"type":"response.output_text.delta","item_id":"msg_1","delta":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! Only `data:` lines matter. `event:` lines, comments and blank keep-alive
//! lines are skipped. The stream ends with `data: [DONE]` or with the
//! connection closing.
//!
//! # Chunk boundaries
//!
//! Network reads split records at arbitrary byte positions: one read may hold
//! half a record, or several. [`FrameDecoder`] keeps an accumulation buffer and
//! only yields a frame once its full line has arrived.
//!
//! ```text
//! push(b"data: {\"type\":\"resp")   -> next_frame() == None   (need more bytes)
//! push(b"onse.created\"}\n\n")      -> next_frame() == Data(..)
//! ```
//!
//! # Scan modes
//!
//! - [`ScanMode::Lines`] drains each line into an owned `String` and matches
//!   the prefix on text.
//! - [`ScanMode::Bytes`] walks the buffer with a cursor and hands out slices of
//!   it directly, so no per-line allocation happens.
//!
//! Both modes yield identical frames for identical input.
//!
//! # Decode failures
//!
//! A `data:` line that is not valid UTF-8 is skipped. Once `max_failures`
//! such lines arrive back to back the decoder gives up with [`Error::Decode`],
//! since a connection that keeps producing garbage is most likely corrupted.

use crate::{Error, Result};
use std::ops::Range;

/// Prefix of the lines that carry payloads
pub const DATA_PREFIX: &str = "data:";

/// Payload that marks the end of the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Frame decoder strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Owned line strings, prefix matched on text
    #[default]
    Lines,
    /// Cursor over the byte buffer, no per-line allocation
    Bytes,
}

impl ScanMode {
    /// Parse a scan mode from a string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lines" | "line" | "default" => Some(ScanMode::Lines),
            "bytes" | "byte" | "optimized" => Some(ScanMode::Bytes),
            _ => None,
        }
    }
}

/// One decoded SSE record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// JSON payload candidate, guaranteed to be valid UTF-8
    Data(&'a [u8]),
    /// The `[DONE]` sentinel
    Done,
}

impl<'a> Frame<'a> {
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self {
            Frame::Data(bytes) => Some(bytes),
            Frame::Done => None,
        }
    }

    pub fn payload_str(&self) -> Option<&'a str> {
        self.payload().and_then(|b| std::str::from_utf8(b).ok())
    }
}

// Outcome of classifying a single line. `Data` carries the payload offset.
#[derive(Debug, PartialEq, Eq)]
enum LineKind {
    Skip,
    Done,
    Data(usize),
}

// Position-only result of a scan, resolved to a borrowed `Frame` afterwards.
enum Scanned {
    Data(Range<usize>),
    Done,
}

/// Splits an arbitrarily-chunked byte stream into SSE frames.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: ScanMode,
    buf: Vec<u8>,
    /// Start of unconsumed bytes (byte mode only)
    cursor: usize,
    /// Last decoded line (line mode only)
    scratch: String,
    consecutive_failures: u32,
    total_failures: u64,
    max_failures: u32,
    done: bool,
}

impl FrameDecoder {
    pub fn new(mode: ScanMode, max_failures: u32) -> Self {
        Self {
            mode,
            buf: Vec::new(),
            cursor: 0,
            scratch: String::new(),
            consecutive_failures: 0,
            total_failures: 0,
            max_failures: max_failures.max(1),
            done: false,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// True once the sentinel was seen or decoding gave up
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of undecodable data lines skipped so far
    pub fn failures(&self) -> u64 {
        self.total_failures
    }

    /// Bytes received but not yet consumed as whole lines
    pub fn pending(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Feeds one network read into the decoder.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.done {
            return;
        }
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Signals end of input so an unterminated last line is still decoded.
    pub fn finish(&mut self) {
        if !self.done && self.pending() > 0 {
            self.buf.push(b'\n');
        }
    }

    /// Returns the next complete frame, or `None` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] once `max_failures` consecutive data lines were not
    /// valid UTF-8. The decoder yields nothing afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Frame<'_>>> {
        let scanned = match self.mode {
            ScanMode::Lines => self.scan_lines()?,
            ScanMode::Bytes => self.scan_bytes()?,
        };

        Ok(scanned.map(|s| match s {
            Scanned::Done => Frame::Done,
            Scanned::Data(range) => match self.mode {
                ScanMode::Lines => Frame::Data(&self.scratch.as_bytes()[range]),
                ScanMode::Bytes => Frame::Data(&self.buf[range]),
            },
        }))
    }

    fn scan_lines(&mut self) -> Result<Option<Scanned>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };

            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            match String::from_utf8(line) {
                Ok(text) => self.scratch = text,
                Err(e) => {
                    if e.as_bytes().starts_with(DATA_PREFIX.as_bytes()) {
                        self.record_failure()?;
                    }
                    continue;
                }
            }

            match classify_text(&self.scratch) {
                LineKind::Skip => continue,
                LineKind::Done => {
                    self.done = true;
                    return Ok(Some(Scanned::Done));
                }
                LineKind::Data(offset) => {
                    self.consecutive_failures = 0;
                    return Ok(Some(Scanned::Data(offset..self.scratch.len())));
                }
            }
        }
    }

    fn scan_bytes(&mut self) -> Result<Option<Scanned>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(pos) = self.buf[self.cursor..].iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };

            let start = self.cursor;
            let mut end = start + pos;
            self.cursor = end + 1;
            if end > start && self.buf[end - 1] == b'\r' {
                end -= 1;
            }

            match classify_bytes(&self.buf[start..end]) {
                LineKind::Skip => continue,
                LineKind::Done => {
                    self.done = true;
                    return Ok(Some(Scanned::Done));
                }
                LineKind::Data(offset) => {
                    let payload = start + offset..end;
                    if std::str::from_utf8(&self.buf[payload.clone()]).is_err() {
                        self.record_failure()?;
                        continue;
                    }
                    self.consecutive_failures = 0;
                    return Ok(Some(Scanned::Data(payload)));
                }
            }
        }
    }

    fn record_failure(&mut self) -> Result<()> {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        log::warn!(
            "skipping SSE data line with invalid UTF-8 ({} consecutive)",
            self.consecutive_failures
        );
        if self.consecutive_failures >= self.max_failures {
            self.done = true;
            return Err(Error::decode(format!(
                "{} consecutive SSE frames were not valid UTF-8",
                self.consecutive_failures
            )));
        }
        Ok(())
    }
}

fn classify_text(line: &str) -> LineKind {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineKind::Skip;
    };
    let offset = DATA_PREFIX.len() + usize::from(rest.starts_with(' '));
    classify_payload(line[offset..].trim_ascii(), offset)
}

fn classify_bytes(line: &[u8]) -> LineKind {
    let Some(rest) = line.strip_prefix(DATA_PREFIX.as_bytes()) else {
        return LineKind::Skip;
    };
    let offset = DATA_PREFIX.len() + usize::from(rest.first() == Some(&b' '));
    match std::str::from_utf8(line[offset..].trim_ascii()) {
        Ok(trimmed) => classify_payload(trimmed, offset),
        // Validated (and counted) by the caller
        Err(_) => LineKind::Data(offset),
    }
}

fn classify_payload(trimmed: &str, offset: usize) -> LineKind {
    if trimmed.is_empty() {
        LineKind::Skip
    } else if trimmed == DONE_SENTINEL {
        LineKind::Done
    } else {
        LineKind::Data(offset)
    }
}
