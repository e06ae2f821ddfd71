//! Configuration for a stream instance
//!
//! [`StreamConfig`] is built either through its builder or from environment
//! variables layered over the defaults.
//!
//! | Variable                               | Field                 |
//! |----------------------------------------|-----------------------|
//! | `RESPONSES_STREAM_BUFFER_CAPACITY`     | `buffer_capacity`     |
//! | `RESPONSES_STREAM_OVERFLOW`            | `overflow_policy`     |
//! | `RESPONSES_STREAM_SCAN_MODE`           | `scan_mode`           |
//! | `RESPONSES_STREAM_MAX_DECODE_FAILURES` | `max_decode_failures` |
//! | `RESPONSES_STREAM_EVENT_LOG`           | `event_log` (path)    |

use crate::buffer::OverflowPolicy;
use crate::diagnostics::EventLog;
use crate::sse::ScanMode;
use crate::{Error, Result};
use std::env;
use std::sync::Arc;

/// Default number of chunks held between producer and consumer
pub const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// Default number of consecutive undecodable frames tolerated before failing
pub const DEFAULT_MAX_DECODE_FAILURES: u32 = 3;

pub const ENV_BUFFER_CAPACITY: &str = "RESPONSES_STREAM_BUFFER_CAPACITY";
pub const ENV_OVERFLOW: &str = "RESPONSES_STREAM_OVERFLOW";
pub const ENV_SCAN_MODE: &str = "RESPONSES_STREAM_SCAN_MODE";
pub const ENV_MAX_DECODE_FAILURES: &str = "RESPONSES_STREAM_MAX_DECODE_FAILURES";
pub const ENV_EVENT_LOG: &str = "RESPONSES_STREAM_EVENT_LOG";

/// Options for one stream instance
#[derive(Clone)]
pub struct StreamConfig {
    /// Maximum chunks buffered for the consumer
    pub buffer_capacity: usize,

    /// What happens when the buffer is full
    pub overflow_policy: OverflowPolicy,

    /// Frame decoder strategy
    pub scan_mode: ScanMode,

    /// Consecutive decode failures that end the stream
    pub max_decode_failures: u32,

    /// Optional diagnostic log, shared between streams
    pub event_log: Option<Arc<EventLog>>,
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("buffer_capacity", &self.buffer_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("scan_mode", &self.scan_mode)
            .field("max_decode_failures", &self.max_decode_failures)
            .field(
                "event_log",
                &self.event_log.as_ref().map(|log| log.path().display().to_string()),
            )
            .finish()
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
            scan_mode: ScanMode::Lines,
            max_decode_failures: DEFAULT_MAX_DECODE_FAILURES,
            event_log: None,
        }
    }
}

impl StreamConfig {
    /// Create a new builder for StreamConfig
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Defaults overridden by `RESPONSES_STREAM_*` environment variables
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use responses_stream::StreamConfig;
    ///
    /// let config = StreamConfig::from_env()?;
    /// # Ok::<(), responses_stream::Error>(())
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StreamConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = StreamConfig::builder();

        if let Some(raw) = lookup(ENV_BUFFER_CAPACITY) {
            let capacity = raw.trim().parse::<usize>().map_err(|e| {
                Error::config(format!("{} must be an integer: {}", ENV_BUFFER_CAPACITY, e))
            })?;
            builder = builder.buffer_capacity(capacity);
        }

        if let Some(raw) = lookup(ENV_OVERFLOW) {
            let policy = OverflowPolicy::from_str(&raw).ok_or_else(|| {
                Error::config(format!("{} has unknown value '{}'", ENV_OVERFLOW, raw))
            })?;
            builder = builder.overflow_policy(policy);
        }

        if let Some(raw) = lookup(ENV_SCAN_MODE) {
            let mode = ScanMode::from_str(&raw).ok_or_else(|| {
                Error::config(format!("{} has unknown value '{}'", ENV_SCAN_MODE, raw))
            })?;
            builder = builder.scan_mode(mode);
        }

        if let Some(raw) = lookup(ENV_MAX_DECODE_FAILURES) {
            let max = raw.trim().parse::<u32>().map_err(|e| {
                Error::config(format!(
                    "{} must be an integer: {}",
                    ENV_MAX_DECODE_FAILURES, e
                ))
            })?;
            builder = builder.max_decode_failures(max);
        }

        if let Some(path) = lookup(ENV_EVENT_LOG).filter(|p| !p.trim().is_empty()) {
            builder = builder.event_log(Arc::new(EventLog::open(path.trim())?));
        }

        builder.build()
    }
}

/// Builder for StreamConfig
#[derive(Default)]
pub struct StreamConfigBuilder {
    buffer_capacity: Option<usize>,
    overflow_policy: Option<OverflowPolicy>,
    scan_mode: Option<ScanMode>,
    max_decode_failures: Option<u32>,
    event_log: Option<Arc<EventLog>>,
}

impl StreamConfigBuilder {
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = Some(policy);
        self
    }

    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = Some(mode);
        self
    }

    pub fn max_decode_failures(mut self, max: u32) -> Self {
        self.max_decode_failures = Some(max);
        self
    }

    pub fn event_log(mut self, log: Arc<EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    pub fn build(self) -> Result<StreamConfig> {
        let defaults = StreamConfig::default();

        let buffer_capacity = self.buffer_capacity.unwrap_or(defaults.buffer_capacity);
        if buffer_capacity == 0 {
            return Err(Error::config("buffer_capacity must be greater than zero"));
        }

        let max_decode_failures = self
            .max_decode_failures
            .unwrap_or(defaults.max_decode_failures);
        if max_decode_failures == 0 {
            return Err(Error::config(
                "max_decode_failures must be greater than zero",
            ));
        }

        Ok(StreamConfig {
            buffer_capacity,
            overflow_policy: self.overflow_policy.unwrap_or(defaults.overflow_policy),
            scan_mode: self.scan_mode.unwrap_or(defaults.scan_mode),
            max_decode_failures,
            event_log: self.event_log,
        })
    }
}
