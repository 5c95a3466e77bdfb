//! Error types for the AGI and AMI engines

use thiserror::Error;

/// Errors surfaced by the request parser and the manager session.
///
/// The AGI command channel never returns these from
/// [`AgiChannel::execute`](crate::AgiChannel::execute); transport trouble there
/// degrades to [`AgiResponse::broken()`](crate::AgiResponse::broken).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AsteriskError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before a complete line or frame arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Manager operation attempted without an open stream.
    #[error("Not connected")]
    NotConnected,

    /// Connect timeout, or a caller-imposed deadline expired.
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Elapsed deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Malformed protocol data.
    #[error("Protocol error: {message}")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },

    /// An `agi_<field>` header did not name a known request property.
    #[error("Unknown Request property: {name}")]
    UnknownRequestProperty {
        /// Field name as it appeared after the `agi_` prefix.
        name: String,
    },

    /// Manager login was rejected.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        /// `Message` header of the login response, when present.
        reason: String,
    },

    /// Option document could not be deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AsteriskError {
    /// Create a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Create an authentication failure.
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    /// Whether the error means the stream is no longer usable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }
}

/// Result alias used throughout the crate.
pub type AsteriskResult<T> = Result<T, AsteriskError>;
