//! Error types for agentwire.

use thiserror::Error;

/// Main error type for all agentwire operations.
#[derive(Debug, Error)]
pub enum AgentwireError {
    /// I/O error on the duplex stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error outside of line decoding.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Incoming line could not be decoded into a request.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A request arrived before any agent was bound.
    #[error("No agent is bound")]
    ProviderNotBound,

    /// The bound agent has no operation with this name.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Positional arguments did not match what the operation expects.
    #[error("Invalid arguments for {function}: {source}")]
    InvalidArguments {
        /// Operation name.
        function: String,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// Fault raised by the agent's operation.
    #[error("Operation failed: {0}")]
    Provider(String),

    /// The operation was cancelled through `cancelRequest`.
    #[error("Operation cancelled")]
    Cancelled,

    /// The task running a pending operation panicked or was aborted.
    #[error("Operation task failed: {0}")]
    TaskFailed(String),

    /// Output path closed (writer task gone).
    #[error("Connection closed")]
    ConnectionClosed,

    /// Nobody is listening for agent events anymore.
    #[error("Event channel closed")]
    EventChannelClosed,
}

impl AgentwireError {
    /// Build a [`AgentwireError::Provider`] fault from any displayable message.
    pub fn provider(message: impl std::fmt::Display) -> Self {
        Self::Provider(message.to_string())
    }
}

/// Reasons a line fails to decode into a request.
///
/// A line that fails to decode is dropped without a response, since there
/// is no trustworthy id to answer with.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line is not JSON at all (or is truncated).
    #[error("invalid JSON: {0}")]
    Syntax(serde_json::Error),

    /// The line is JSON but not `[id, {"func": ..., "args": [...]}]`.
    #[error("malformed message: {0}")]
    Shape(serde_json::Error),

    /// `cancelRequest` without an integer target id.
    #[error("cancelRequest expects an integer target id")]
    InvalidCancelTarget,
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match e.classify() {
            Category::Syntax | Category::Eof | Category::Io => Self::Syntax(e),
            Category::Data => Self::Shape(e),
        }
    }
}

/// Result type alias using AgentwireError.
pub type Result<T> = std::result::Result<T, AgentwireError>;
