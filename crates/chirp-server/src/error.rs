//! Error types for the chirp server
//!
//! Feed operations never fail: a missing timestamp is a `false` result,
//! not an error. Everything here comes from the edges (decoding input,
//! writing output, configuration, thread management).

use thiserror::Error;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can end a dispatcher run
#[derive(Debug, Error)]
pub enum ServerError {
    /// A request record could not be decoded; fatal to the input stream
    #[error("failed to decode request: {0}")]
    Decode(#[source] serde_json::Error),

    /// A response could not be serialized
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// Writing to the output sink failed
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration was rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A consumer thread could not be started
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A consumer thread panicked
    #[error("consumer thread panicked")]
    WorkerPanicked,
}

impl ServerError {
    /// True for errors caused by malformed input rather than the environment
    pub fn is_decode(&self) -> bool {
        matches!(self, ServerError::Decode(_))
    }
}
