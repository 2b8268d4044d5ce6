//! Wire envelopes and typed message payloads.
//!
//! Every frame on the socket is a JSON envelope
//! `{"type","v","correlationId","payload"}`; server responses additionally
//! carry `"kind"` and, on error, `"error": {"code","message"}`. The one
//! exception is the bare text frame `"pong"`, accepted as a liveness
//! acknowledgment.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use tm_core::constants::{failure_codes, message_types, WIRE_VERSION};

/// Connection status of the managed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Socket opening or awaiting authentication.
    Connecting,
    /// Authenticated and live.
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Outbound message envelope wrapping a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEnvelope {
    /// Message type, keys the payload schema.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Wire protocol version.
    pub v: String,
    /// Correlates responses to requests.
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    /// Type-specific payload.
    pub payload: Value,
}

impl MessageEnvelope {
    /// Construct an envelope with a fresh correlation id.
    ///
    /// Callers should prefer `MessageValidator::build_envelope`, which
    /// checks the payload against the type's schema first.
    pub fn new(message_type: &str, payload: Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            v: WIRE_VERSION.to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// Serialize to the wire text frame.
    pub fn to_frame(&self) -> String {
        // Envelope fields are all serializable; this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Response classification on inbound envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Successful response.
    #[serde(rename = "OK", alias = "RESPONSE")]
    Ok,
    /// Error response; `error` carries the detail.
    #[serde(rename = "ERROR")]
    Error,
}

/// Error body on `kind: ERROR` responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Inbound envelope: message fields plus response classification.
///
/// Parsed defensively -- missing optional fields never reject a frame;
/// frames that are not this shape at all are ignored upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub v: String,
    #[serde(rename = "correlationId", default)]
    pub correlation_id: String,
    #[serde(default)]
    pub kind: Option<ResponseKind>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ResponseEnvelope {
    /// Whether this response reports an error.
    pub fn is_error(&self) -> bool {
        self.kind == Some(ResponseKind::Error) || self.error.is_some()
    }
}

/// `connection_failed` codes, with a fallback for codes this client
/// version does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCode {
    /// Session token no longer valid; refreshable.
    InvalidSession,
    /// Auth token malformed or expired; refreshable.
    InvalidAuthToken,
    /// Client sent a type the server refuses pre-auth. Client defect.
    InvalidMessageType,
    /// Authorization payload malformed. Client defect.
    InvalidAuthData,
    /// Unrecognized code.
    Unknown(String),
}

impl FailureCode {
    pub fn parse(code: &str) -> Self {
        match code {
            failure_codes::INVALID_SESSION => Self::InvalidSession,
            failure_codes::INVALID_AUTH_TOKEN => Self::InvalidAuthToken,
            failure_codes::INVALID_MESSAGE_TYPE => Self::InvalidMessageType,
            failure_codes::INVALID_AUTH_DATA => Self::InvalidAuthData,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether a credential refresh may recover from this failure.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::InvalidSession | Self::InvalidAuthToken)
    }
}

// -- Typed payloads --

/// `authorization` payload: first frame after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationPayload {
    /// Session token.
    pub session: String,
    /// Client version string.
    pub version: String,
}

/// `chat` payload: a chat message within a match conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub match_id: i64,
    pub message: String,
}

/// Actions a client can take on an existing match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    Accept,
    Reject,
    UpdateTarget,
    FriendMatch,
    Unmatch,
}

/// `match` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchActionPayload {
    pub match_id: i64,
    pub action: MatchAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_profile: Option<i64>,
}

/// `match_removed` payload: a match was dissolved server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRemovedPayload {
    pub match_id: i64,
}

/// `profile` payload: a swipe decision on a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDecisionPayload {
    pub target_profile: i64,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_profile: Option<i64>,
}

/// `profile_response` payload: server outcome for a profile decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponsePayload {
    pub message: String,
    pub success: bool,
}

/// `connection_failed` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionFailedPayload {
    pub code: String,
    pub message: String,
}

/// Build the authorization envelope for a credential.
pub fn authorization_envelope(session_token: &str, client_version: &str) -> MessageEnvelope {
    MessageEnvelope::new(
        message_types::AUTHORIZATION,
        serde_json::json!({
            "session": session_token,
            "version": client_version,
        }),
    )
}

/// Build a liveness probe envelope.
pub fn ping_envelope() -> MessageEnvelope {
    MessageEnvelope::new(message_types::PING, serde_json::json!({}))
}
