//! # Responses Stream
//!
//! Streaming ingestion and event reconstruction for OpenAI-style "Responses"
//! Server-Sent Event streams.
//!
//! ## Overview
//!
//! A Responses stream is a long-lived HTTP body of `data: <json>` records. The
//! event vocabulary is large, unversioned and loosely ordered: a function
//! call's arguments arrive as many small fragments interleaved with text
//! deltas for other items, and new event types appear without notice. This
//! crate turns such a body into an ordered, typed sequence of chunks a
//! consumer can render or act on.
//!
//! ## Key Features
//!
//! - **Incremental framing**: records split across network reads are reassembled
//! - **Closed event model**: the open `type` vocabulary is classified into [`NormalizedEvent`]
//! - **Item reconstruction**: tool-call arguments, interpreter code and text are
//!   accumulated per item in an [`ItemStateTracker`]
//! - **Bounded buffering**: a slow consumer never stalls the network reader
//! - **Graceful degradation**: malformed or unknown events are skipped, not fatal
//! - **Cancellation**: dropping or interrupting a stream stops the producer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use responses_stream::{NormalizedEvent, StreamConfig, from_response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let response = reqwest::Client::new()
//!         .post("https://api.openai.com/v1/responses")
//!         .bearer_auth(std::env::var("OPENAI_API_KEY")?)
//!         .json(&serde_json::json!({"model": "gpt-4o", "input": "Hi", "stream": true}))
//!         .send()
//!         .await?;
//!
//!     let mut stream = from_response(response, StreamConfig::from_env()?).await?;
//!     while let Some(chunk) = stream.next().await {
//!         let chunk = chunk?;
//!         match &chunk.event {
//!             Some(NormalizedEvent::ItemDone { item, .. }) if item.item_type.is_tool_call() => {
//!                 println!("\ntool call {:?}: {:?}", item.name, item.arguments());
//!             }
//!             _ => {
//!                 if let Some(text) = chunk.text_delta() {
//!                     print!("{}", text);
//!                 }
//!             }
//!         }
//!         if chunk.is_complete {
//!             println!("\nusage: {:?}", chunk.usage);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **sse**: frame decoder splitting bytes into `data:` payloads
//! - **normalizer**: event classification and normalization
//! - **tracker**: per-item accumulation state
//! - **buffer**: bounded producer/consumer queue
//! - **stream**: orchestration of the above into a `futures::Stream`
//! - **config**: stream options, builder and environment overrides
//! - **diagnostics**: optional JSON-lines traffic log
//! - **types**: normalized and vendor data types
//! - **error**: error types and conversions

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
// These modules are private (internal implementation details) unless explicitly
// re-exported through `pub use` statements below.

/// Bounded queue between the stream producer and its consumer.
mod buffer;

/// Stream options with builder and `RESPONSES_STREAM_*` environment overrides.
mod config;

/// Append-only JSON-lines log of frames and chunks.
mod diagnostics;

/// Error types and conversions used across all public APIs.
/// Defines the `Error` enum and `Result<T>` type alias.
mod error;

/// Classification of vendor `type` strings and conversion to normalized events.
mod normalizer;

/// Server-Sent Events frame decoder.
mod sse;

/// Orchestration of decoder, normalizer, tracker and buffer into one stream.
mod stream;

/// Per-item accumulation state shared by one stream's producer and readers.
mod tracker;

/// Normalized events, output chunks, items and the vendor wire types.
mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Streaming ---

pub use stream::{ChunkStream, ResponseStream, from_response, stream_bytes};

// --- Configuration ---

pub use buffer::OverflowPolicy;
pub use config::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_DECODE_FAILURES, ENV_BUFFER_CAPACITY, ENV_EVENT_LOG,
    ENV_MAX_DECODE_FAILURES, ENV_OVERFLOW, ENV_SCAN_MODE, StreamConfig, StreamConfigBuilder,
};
pub use sse::ScanMode;

// --- Pipeline Components ---

pub use buffer::StreamBuffer;
pub use diagnostics::EventLog;
pub use normalizer::{EventClass, EventNormalizer, classify};
pub use sse::{DATA_PREFIX, DONE_SENTINEL, Frame, FrameDecoder};
pub use tracker::{ItemStateTable, ItemStateTracker};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Core Types ---

pub use types::{
    ContentDelta, ContentFamily, ItemStatus, ItemType, LifecyclePhase, NormalizedEvent,
    OutputChunk, PartPhase, ResponseInfo, StreamItem, ToolPhase, ToolType, Usage, VendorEvent,
    VendorItem, VendorResponse,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use responses_stream::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ContentFamily, Error, ItemStateTracker, LifecyclePhase, NormalizedEvent, OutputChunk,
        OverflowPolicy, ResponseStream, Result, ScanMode, StreamConfig, StreamItem, from_response,
        stream_bytes,
    };
}
