//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "2 Man";

/// Client version reported in the authorization payload.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version carried in every envelope (`"v"` field).
pub const WIRE_VERSION: &str = "1";

/// Base delay for exponential reconnect backoff.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Cap applied to the exponential reconnect delay.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;

/// Automatic reconnect attempts before the manager gives up and surfaces
/// the retries-exhausted condition to the application.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Interval between liveness probes while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// How long the connection may go without a liveness acknowledgment
/// before it is considered dead (2x the probe interval).
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 60;

/// Reserved message type names on the wire.
pub mod message_types {
    /// Outbound credential presentation, first frame after socket open.
    pub const AUTHORIZATION: &str = "authorization";
    /// Inbound acknowledgment that authentication succeeded.
    pub const CONNECTION_SUCCESS: &str = "connection_success";
    /// Inbound authentication/protocol rejection.
    pub const CONNECTION_FAILED: &str = "connection_failed";
    /// Outbound liveness probe.
    pub const PING: &str = "ping";
    /// Bare (non-JSON) liveness acknowledgment text frame.
    pub const PONG: &str = "pong";
}

/// `connection_failed` codes emitted by the server.
pub mod failure_codes {
    /// Session token is no longer valid; refreshable.
    pub const INVALID_SESSION: &str = "INVALID_SESSION";
    /// Auth token is malformed or expired; refreshable.
    pub const INVALID_AUTH_TOKEN: &str = "INVALID_AUTH_TOKEN";
    /// Client sent a message type the server does not accept pre-auth.
    pub const INVALID_MESSAGE_TYPE: &str = "INVALID_MESSAGE_TYPE";
    /// The authorization payload itself was malformed.
    pub const INVALID_AUTH_DATA: &str = "INVALID_AUTH_DATA";
}
