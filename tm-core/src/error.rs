//! Global error types for the 2 Man client.
//!
//! All error categories across the application are unified into a single
//! `TmError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using TmError.
pub type TmResult<T> = Result<T, TmError>;

/// Unified error type covering all error categories in the client.
#[derive(Error, Debug)]
pub enum TmError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Socket errors --
    /// WebSocket connection error.
    #[error("socket error: {0}")]
    Socket(String),

    /// The socket disconnected unexpectedly.
    #[error("socket disconnected")]
    SocketDisconnected,

    /// The server rejected the connection during authentication.
    #[error("connection rejected: {code}: {message}")]
    ConnectionRejected {
        /// Failure code reported by the server.
        code: String,
        /// Human-readable message from the server.
        message: String,
    },

    // -- Session errors --
    /// No credential is available to authenticate with.
    #[error("no session available")]
    NoSession,

    /// Credential refresh failed.
    #[error("session refresh failed: {0}")]
    SessionRefresh(String),

    // -- Message errors --
    /// An outbound payload failed its per-type schema check.
    ///
    /// Raised before any transmission attempt. Never retried automatically;
    /// the caller must correct the payload.
    #[error("invalid payload for message type '{message_type}': {reason}")]
    Validation {
        /// Declared message type.
        message_type: String,
        /// What failed.
        reason: String,
    },

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for TmError {
    fn from(e: serde_json::Error) -> Self {
        TmError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for TmError {
    fn from(e: toml::de::Error) -> Self {
        TmError::Config(e.to_string())
    }
}
