//! Validate command - check a payload against its message type schema.

use std::io::Read;

use console::style;

use tm_core::error::{TmError, TmResult};
use tm_socket::MessageValidator;

/// Run the validate command. Prints the envelope that would be sent.
pub fn run(message_type: &str, payload: Option<String>) -> TmResult<()> {
    let raw = match payload {
        Some(p) => p,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| TmError::Validation {
            message_type: message_type.to_string(),
            reason: format!("payload is not valid JSON: {e}"),
        })?;

    let validator = MessageValidator::new();
    match validator.build_envelope(message_type, payload) {
        Ok(envelope) => {
            println!("{} payload is valid", style("OK").green().bold());
            println!("{}", envelope.to_frame());
            Ok(())
        }
        Err(e) => {
            println!("{} {e}", style("FAIL").red().bold());
            Err(e)
        }
    }
}
