//! Result validator: syntax-level gatekeeping before a worker result is committed.
//!
//! No semantic checks (label whitelists, answer schema) happen here.

use serde_json::value::RawValue;

use crate::error::ValidationError;

/// Check that a JSON payload is present, well-formed, and not `null`.
///
/// Returns the payload text unchanged on success.
pub fn validate_payload(raw: Option<&str>) -> Result<Box<RawValue>, ValidationError> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(ValidationError::EmptyResult),
    };

    let payload = RawValue::from_string(raw.to_string())
        .map_err(|e| ValidationError::MalformedResult(e.to_string()))?;
    if payload.get() == "null" {
        return Err(ValidationError::EmptyResult);
    }
    Ok(payload)
}

/// Validate a worker result: non-blank label plus a well-formed payload.
pub fn validate_result(
    classification: &str,
    model_answer: Option<&str>,
) -> Result<Box<RawValue>, ValidationError> {
    if classification.trim().is_empty() {
        return Err(ValidationError::EmptyClassification);
    }
    validate_payload(model_answer)
}
