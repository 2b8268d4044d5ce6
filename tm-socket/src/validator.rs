//! Per-type payload validation and envelope construction.
//!
//! Each message type has an associated payload schema, expressed as the
//! serde shape of its typed payload struct. Outbound payloads are checked
//! before an envelope is built, so a malformed payload fails locally and
//! never touches the transport. Inbound payloads are checked against the
//! schema for their declared type before dispatch.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use tm_core::constants::message_types;
use tm_core::error::{TmError, TmResult};

use crate::envelope::{
    AuthorizationPayload, ChatPayload, ConnectionFailedPayload, MatchActionPayload,
    MatchRemovedPayload, MessageEnvelope, ProfileDecisionPayload, ProfileResponsePayload,
};

type SchemaCheck = fn(&Value) -> Result<(), String>;

fn check<T: DeserializeOwned>(payload: &Value) -> Result<(), String> {
    serde_json::from_value::<T>(payload.clone())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Empty-object schema for types carrying no payload fields.
fn check_empty(payload: &Value) -> Result<(), String> {
    if payload.is_object() || payload.is_null() {
        Ok(())
    } else {
        Err("expected an object payload".to_string())
    }
}

/// Validates payloads against per-type schemas and constructs envelopes.
pub struct MessageValidator {
    schemas: HashMap<&'static str, SchemaCheck>,
}

impl MessageValidator {
    /// Build a validator with every known message type registered.
    pub fn new() -> Self {
        let mut schemas: HashMap<&'static str, SchemaCheck> = HashMap::new();
        schemas.insert(message_types::AUTHORIZATION, check::<AuthorizationPayload>);
        schemas.insert(message_types::PING, check_empty);
        schemas.insert(message_types::CONNECTION_SUCCESS, check_empty);
        schemas.insert(
            message_types::CONNECTION_FAILED,
            check::<ConnectionFailedPayload>,
        );
        schemas.insert("chat", check::<ChatPayload>);
        schemas.insert("match", check::<MatchActionPayload>);
        schemas.insert("match_removed", check::<MatchRemovedPayload>);
        schemas.insert("profile", check::<ProfileDecisionPayload>);
        schemas.insert("profile_response", check::<ProfileResponsePayload>);
        Self { schemas }
    }

    /// Whether a schema is registered for this type.
    pub fn knows(&self, message_type: &str) -> bool {
        self.schemas.contains_key(message_type)
    }

    /// Validate a payload and wrap it in an envelope.
    ///
    /// Fails with `TmError::Validation` before any transmission attempt;
    /// construction errors are never retried automatically.
    pub fn build_envelope(&self, message_type: &str, payload: Value) -> TmResult<MessageEnvelope> {
        let schema = self.schemas.get(message_type).ok_or_else(|| TmError::Validation {
            message_type: message_type.to_string(),
            reason: "no schema registered for message type".to_string(),
        })?;
        schema(&payload).map_err(|reason| TmError::Validation {
            message_type: message_type.to_string(),
            reason,
        })?;
        Ok(MessageEnvelope::new(message_type, payload))
    }

    /// Validate an inbound payload against its declared type.
    ///
    /// Unknown types pass: the dispatcher treats them as a no-op unless a
    /// consumer explicitly subscribed to them. A known type with a payload
    /// that fails its schema is rejected (logged by the caller, not
    /// dispatched).
    pub fn validate_inbound(&self, message_type: &str, payload: &Value) -> Result<(), String> {
        match self.schemas.get(message_type) {
            Some(schema) => schema(payload),
            None => {
                warn!("no schema for inbound message type '{message_type}', passing through");
                Ok(())
            }
        }
    }
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new()
    }
}
