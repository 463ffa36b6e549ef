//! Signaling relay error types.
//!
//! Errors split along who sees them:
//!
//! - **Agent-facing** protocol violations never surface here; the socket engine
//!   answers them with an `ERROR` frame and closes the connection.
//! - **Caller-facing** failures (`SessionNotFound`, `AgentDisconnected`,
//!   `ExchangeTimeout`, ...) are returned to whoever asked the relay for an
//!   exchange, typically an HTTP handler.
//!
//! The `Decode` variant keeps the underlying parse failure via `#[source]`.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::DecodeError;

/// Signaling relay errors.
#[derive(Error, Debug)]
pub enum SignalError {
    /// No live, handshaken session with this ID.
    #[error("No matching agent session found: {0}")]
    SessionNotFound(String),

    /// A correlated message was sent before the agent's hello was accepted.
    #[error("Handshake not established")]
    HandshakeNotEstablished,

    /// The agent connection ended before the exchange completed.
    #[error("Remote agent disconnected")]
    AgentDisconnected,

    /// The agent did not answer an exchange in time.
    #[error("Exchange {exchange_id} timed out after {}s", .timeout.as_secs())]
    ExchangeTimeout {
        /// Exchange that expired.
        exchange_id: u64,
        /// Configured wait.
        timeout: Duration,
    },

    /// Inbound frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[source] DecodeError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, SignalError>;

impl From<DecodeError> for SignalError {
    fn from(err: DecodeError) -> Self {
        SignalError::Decode(err)
    }
}

impl From<toml::de::Error> for SignalError {
    fn from(err: toml::de::Error) -> Self {
        SignalError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SignalError {
    fn from(err: toml::ser::Error) -> Self {
        SignalError::Config(err.to_string())
    }
}

impl From<std::net::AddrParseError> for SignalError {
    fn from(err: std::net::AddrParseError) -> Self {
        SignalError::Config(format!("Invalid listen address: {err}"))
    }
}

impl SignalError {
    /// Whether the failure came from the agent side going away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SignalError::AgentDisconnected)
    }
}
