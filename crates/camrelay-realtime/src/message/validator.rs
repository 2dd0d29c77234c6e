//! Message validation rules.

use camrelay_core::error::AppError;
use camrelay_core::result::AppResult;

use super::types::InboundEnvelope;

/// Validates raw inbound text before parsing.
pub fn validate_inbound(raw: &str, max_bytes: usize) -> AppResult<()> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validates and parses an inbound message.
///
/// Unknown event types and missing or malformed fields are reported as
/// validation errors.
pub fn parse_inbound(raw: &str, max_bytes: usize) -> AppResult<InboundEnvelope> {
    validate_inbound(raw, max_bytes)?;
    serde_json::from_str(raw)
        .map_err(|e| AppError::validation(format!("Failed to parse message: {e}")))
}

/// Validates an acknowledgement id supplied by a client.
pub fn validate_ack_id(ack_id: &str) -> AppResult<()> {
    if ack_id.is_empty() || ack_id.len() > 128 {
        return Err(AppError::validation("Invalid ack_id length"));
    }
    Ok(())
}
