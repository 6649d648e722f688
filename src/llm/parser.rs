//! Response decoding for the reasoning collaborator
//!
//! Models occasionally wrap the JSON payload in markdown fences despite the
//! output contract; strip them before decoding. Any decode failure is an
//! `AssistError` for the policy to recover from, never a panic.

use crate::core::error::{Result, SimError};
use crate::llm::policy::AssistResponse;

/// Decode the collaborator's text into an assist response
pub fn parse_assist_response(text: &str) -> Result<AssistResponse> {
    let cleaned = strip_fences(text);
    serde_json::from_str(&cleaned)
        .map_err(|e| SimError::AssistError(format!("malformed assist response: {e}")))
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}
