//! Stream orchestration: bytes in, ordered [`OutputChunk`]s out.
//!
//! # Architecture
//!
//! ```text
//! byte source (reqwest bytes_stream or any Stream<Result<B, E>>)
//!     │
//!     │ producer task (tokio::spawn)
//!     │   FrameDecoder ─► EventNormalizer ─► ItemStateTracker
//!     │        │                 │
//!     │        └── sequence numbers assigned here
//!     ▼
//! StreamBuffer<Result<OutputChunk>>  (bounded, drop-oldest by default)
//!     │
//!     │ ResponseStream (futures::Stream)
//!     ▼
//! consumer
//! ```
//!
//! The producer is the only writer of the stream's buffer and feeds the tracker.
//! It reads the network as fast as bytes arrive; under the default drop-oldest
//! policy a slow consumer loses intermediate chunks instead of stalling the
//! reader. Items are marked delivered on the consumer side as their `ItemDone`
//! chunks are yielded, so an evicted `ItemDone` never releases tracker state.
//!
//! # Termination
//!
//! Exactly one of the following ends every stream:
//!
//! - **Completion**: the `[DONE]` sentinel, or a clean end of the byte source.
//!   A single chunk with `is_complete == true` is delivered last, carrying the
//!   most recent [`Usage`](crate::Usage).
//! - **Failure**: a transport error, repeated decode failures, or a
//!   `response.failed` / `response.incomplete` lifecycle event (whose chunk is
//!   delivered first). The consumer receives one `Err` and no completion chunk.
//! - **Cancellation**: dropping the [`ResponseStream`], calling
//!   [`ResponseStream::interrupt`], or setting the flag returned by
//!   [`ResponseStream::interrupt_handle`]. The producer stops reading and
//!   partially accumulated items are discarded.
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use responses_stream::{StreamConfig, from_response};
//!
//! # async fn example(response: reqwest::Response) -> responses_stream::Result<()> {
//! let mut stream = from_response(response, StreamConfig::default()).await?;
//! while let Some(chunk) = stream.next().await {
//!     let chunk = chunk?;
//!     if let Some(text) = chunk.text_delta() {
//!         print!("{}", text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::buffer::StreamBuffer;
use crate::config::StreamConfig;
use crate::diagnostics::EventLog;
use crate::normalizer::EventNormalizer;
use crate::sse::{Frame, FrameDecoder};
use crate::tracker::ItemStateTracker;
use crate::types::{LifecyclePhase, NormalizedEvent, OutputChunk, ResponseInfo};
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

/// Type-erased chunk stream, e.g. `Box::pin(response_stream)` for storage in a struct
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<OutputChunk>> + Send>>;

type ChunkBuffer = StreamBuffer<Result<OutputChunk>>;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Starts a stream over an HTTP response from the Responses endpoint.
///
/// A non-success status is reported as [`Error::Api`] with the response body,
/// before any streaming starts.
///
/// Must be called from within a tokio runtime.
pub async fn from_response(
    response: reqwest::Response,
    config: StreamConfig,
) -> Result<ResponseStream> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|e| {
            log::warn!("failed to read error response body: {}", e);
            "Unknown error (failed to read response body)".to_string()
        });
        return Err(Error::api(format!("API error {}: {}", status, body)));
    }

    Ok(stream_bytes(response.bytes_stream(), config))
}

/// Starts a stream over any source of byte chunks.
///
/// Chunk boundaries are arbitrary; records split across reads are reassembled.
/// Source errors are converted with `Into<Error>` and end the stream.
///
/// Must be called from within a tokio runtime.
pub fn stream_bytes<S, B, E>(source: S, config: StreamConfig) -> ResponseStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
    let buffer: Arc<ChunkBuffer> =
        Arc::new(StreamBuffer::new(config.buffer_capacity, config.overflow_policy));
    let tracker = ItemStateTracker::new();
    let interrupted = Arc::new(AtomicBool::new(false));

    log::debug!(
        "stream {} starting (scan mode {:?}, capacity {}, policy {:?})",
        id,
        config.scan_mode,
        config.buffer_capacity,
        config.overflow_policy
    );

    let producer = Producer {
        id,
        decoder: FrameDecoder::new(config.scan_mode, config.max_decode_failures),
        normalizer: EventNormalizer::new(tracker.clone()),
        buffer: buffer.clone(),
        interrupted: interrupted.clone(),
        event_log: config.event_log.clone(),
        next_sequence: 0,
    };
    let task = tokio::spawn(producer.run(source));

    let inner = futures::stream::unfold(buffer.clone(), |buffer| async move {
        let item = buffer.next().await?;
        Some((item, buffer))
    });

    ResponseStream {
        id,
        inner: Box::pin(inner),
        buffer,
        tracker,
        interrupted,
        producer: task,
    }
}

/// How the producer loop ended
enum End {
    Completed,
    Failed(Error),
    Interrupted,
}

struct Producer {
    id: u64,
    decoder: FrameDecoder,
    normalizer: EventNormalizer,
    buffer: Arc<ChunkBuffer>,
    interrupted: Arc<AtomicBool>,
    event_log: Option<Arc<EventLog>>,
    next_sequence: u64,
}

impl Producer {
    async fn run<S, B, E>(mut self, source: S)
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<Error>,
    {
        match self.pump(source).await {
            End::Completed => {
                let usage = self.normalizer.usage().cloned();
                let chunk = OutputChunk::completion(self.next_sequence(), usage);
                self.deliver(chunk).await;
                log::debug!(
                    "stream {} completed ({} decode failures, {} payloads ignored)",
                    self.id,
                    self.decoder.failures(),
                    self.normalizer.ignored()
                );
                self.buffer.finish();
            }
            End::Failed(err) => {
                log::warn!("stream {} failed: {}", self.id, err);
                if let Some(log) = &self.event_log {
                    log.record_error(self.id, &err.to_string());
                }
                self.normalizer.tracker().discard_partial();
                self.buffer.push(Err(err)).await;
                self.buffer.finish();
            }
            End::Interrupted => {
                log::debug!("stream {} interrupted", self.id);
                self.normalizer.tracker().discard_partial();
                self.buffer.close();
            }
        }

        if let Some(log) = &self.event_log {
            log.flush();
        }
    }

    async fn pump<S, B, E>(&mut self, source: S) -> End
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<Error>,
    {
        let mut source = pin!(source);
        loop {
            if self.is_interrupted() {
                return End::Interrupted;
            }
            match source.next().await {
                Some(Ok(bytes)) => {
                    self.decoder.push(bytes.as_ref());
                    if let Some(end) = self.drain().await {
                        return end;
                    }
                }
                Some(Err(e)) => return End::Failed(e.into()),
                None => {
                    self.decoder.finish();
                    if let Some(end) = self.drain().await {
                        return end;
                    }
                    log::debug!("stream {} source ended without sentinel", self.id);
                    return End::Completed;
                }
            }
        }
    }

    // Emits every complete frame currently buffered in the decoder.
    async fn drain(&mut self) -> Option<End> {
        loop {
            if self.is_interrupted() {
                return Some(End::Interrupted);
            }
            let event = match self.decoder.next_frame() {
                Ok(None) => return None,
                Ok(Some(Frame::Done)) => return Some(End::Completed),
                Ok(Some(Frame::Data(payload))) => {
                    if let Some(log) = &self.event_log {
                        log.record_frame(self.id, payload);
                    }
                    self.normalizer.normalize_slice(payload)
                }
                Err(e) => return Some(End::Failed(e)),
            };

            if let Some(event) = event {
                if let Some(end) = self.emit(event).await {
                    return Some(end);
                }
            }
        }
    }

    async fn emit(&mut self, event: NormalizedEvent) -> Option<End> {
        let failure = match &event {
            NormalizedEvent::Lifecycle {
                phase, response, ..
            } if phase.is_terminal_error() => Some(Error::response(
                *phase,
                failure_message(*phase, response),
            )),
            _ => None,
        };

        let chunk = OutputChunk::from_event(self.next_sequence(), event);
        if !self.deliver(chunk).await {
            return Some(End::Interrupted);
        }

        failure.map(End::Failed)
    }

    async fn deliver(&mut self, chunk: OutputChunk) -> bool {
        if let Some(log) = &self.event_log {
            log.record_chunk(self.id, &chunk);
        }
        self.buffer.push(Ok(chunk)).await
    }

    fn next_sequence(&mut self) -> u64 {
        let n = self.next_sequence;
        self.next_sequence += 1;
        n
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

fn failure_message(phase: LifecyclePhase, response: &ResponseInfo) -> String {
    if let Some(message) = &response.error {
        return message.clone();
    }
    if let Some(reason) = &response.incomplete_reason {
        return format!("incomplete: {}", reason);
    }
    match &response.id {
        Some(id) => format!("response {} ended as {}", id, phase),
        None => format!("response ended as {}", phase),
    }
}

/// Consumer end of one stream.
///
/// Yields `Ok(OutputChunk)` in strictly increasing `sequence_number` order,
/// ending with either the completion chunk or a single `Err`. Dropping it
/// cancels the producer.
pub struct ResponseStream {
    id: u64,
    inner: ChunkStream,
    buffer: Arc<ChunkBuffer>,
    tracker: ItemStateTracker,
    interrupted: Arc<AtomicBool>,
    producer: JoinHandle<()>,
}

impl ResponseStream {
    /// Process-unique id of this stream (also used in diagnostic logs)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle to this stream's item state.
    ///
    /// Stays valid after the stream ends; terminal items remain readable
    /// until purged.
    pub fn tracker(&self) -> &ItemStateTracker {
        &self.tracker
    }

    /// Chunks evicted so far because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Cancels the stream.
    ///
    /// The producer is aborted, buffered chunks are discarded and the next poll
    /// returns `None`. Safe to call more than once.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.producer.abort();
        self.buffer.close();
        let discarded = self.tracker.discard_partial();
        if discarded > 0 {
            log::debug!(
                "stream {} discarded {} partial items on cancel",
                self.id,
                discarded
            );
        }
    }

    /// Returns a clone of the interrupt flag for cancellation from another task.
    ///
    /// Setting it to `true` stops the producer before its next read and ends
    /// the stream on its next poll.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Coalesces chunks that are already available into batches of at most
    /// `max` (a `max` of zero is treated as one). Order is preserved.
    pub fn batched(self, max: usize) -> impl Stream<Item = Vec<Result<OutputChunk>>> + Send {
        self.ready_chunks(max.max(1))
    }

    /// Drains the stream, concatenating output-text deltas.
    ///
    /// # Errors
    ///
    /// The stream's terminal error, or [`Error::Other`] if it was interrupted.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            if let Some(delta) = chunk?.text_delta() {
                text.push_str(delta);
            }
        }
        if self.is_interrupted() {
            return Err(Error::other("Operation interrupted during text collection"));
        }
        Ok(text)
    }
}

impl Stream for ResponseStream {
    type Item = Result<OutputChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_interrupted() {
            if !self.buffer.is_finished() {
                self.interrupt();
            }
            return Poll::Ready(None);
        }
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(OutputChunk {
            event: Some(NormalizedEvent::ItemDone { item, .. }),
            ..
        }))) = &polled
        {
            // Purge only once the consumer holds the item's final state
            self.tracker.mark_delivered(&item.id);
        }
        polled
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        // A finished buffer means the producer already reached a terminal state
        if !self.buffer.is_finished() {
            self.interrupt();
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("id", &self.id)
            .field("buffer", &self.buffer)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
