//! Error types for the Responses stream pipeline

use crate::types::LifecyclePhase;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (diagnostic log file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Non-success HTTP status from the model server
    #[error("API error: {0}")]
    Api(String),

    /// The byte source failed while the stream was being read
    #[error("Transport error: {0}")]
    Transport(String),

    /// Too many consecutive frames could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The response ended in a failed or incomplete state
    #[error("Response {phase}: {message}")]
    Response {
        phase: LifecyclePhase,
        message: String,
    },

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a terminal response error for a failed/incomplete response
    pub fn response(phase: LifecyclePhase, msg: impl Into<String>) -> Self {
        Error::Response {
            phase,
            message: msg.into(),
        }
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True when the error came from the byte source rather than the payload.
    ///
    /// Read timeouts surface from reqwest as [`Error::Http`] and count here.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Io(_) | Error::Transport(_))
    }
}

// Lets in-memory byte sources that cannot fail feed `stream_bytes`.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
