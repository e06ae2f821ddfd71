//! Optional JSONL diagnostic log of a stream's traffic.
//!
//! When configured, every decoded SSE payload and every chunk handed to the
//! consumer is appended as one JSON object per line:
//!
//! ```text
//! {"stream":1,"kind":"frame","payload":"{\"type\":\"response.created\",...}"}
//! {"stream":1,"kind":"chunk","chunk":{"sequence_number":0,...}}
//! ```
//!
//! Write failures are logged and swallowed. Diagnostics never fail a stream.

use crate::Result;
use crate::types::OutputChunk;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Frame { stream: u64, payload: &'a str },
    Chunk { stream: u64, chunk: &'a OutputChunk },
    Error { stream: u64, message: &'a str },
}

/// Append-only JSONL sink, shareable between streams.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl EventLog {
    /// Opens (or creates) `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::debug!("diagnostic event log at {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a raw `data:` payload as received.
    pub fn record_frame(&self, stream: u64, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        self.write(&Record::Frame {
            stream,
            payload: &payload,
        });
    }

    pub fn record_chunk(&self, stream: u64, chunk: &OutputChunk) {
        self.write(&Record::Chunk { stream, chunk });
    }

    pub fn record_error(&self, stream: u64, message: &str) {
        self.write(&Record::Error { stream, message });
    }

    /// Flushes buffered lines to disk.
    pub fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.flush() {
            log::warn!("failed to flush event log {}: {}", self.path.display(), e);
        }
    }

    fn write(&self, record: &Record<'_>) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("failed to serialize event log record: {}", e);
                return;
            }
        };
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line) {
            log::warn!("failed to write event log {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.flush();
    }
}
