//! Session id extraction and display formatting for backend output.

use serde_json::Value;
use topicbot_core::truncate_with_marker;
use topicbot_session::SESSION_ID_PREFIX;

pub const EMPTY_OUTPUT_TEXT: &str = "✅ Execution complete, no output.";
pub const MAX_OUTPUT_CHARS: usize = 2_000;
pub const TRUNCATED_OUTPUT_CHARS: usize = 1_950;
pub const TRUNCATION_MARKER: &str = "\n\n... (output truncated)";
const SESSION_FOOTER_LABEL: &str = "📎 Session:";

/// Finds a backend session id in `output`.
///
/// Structured JSON (an object, or an array of event objects) is searched
/// first; anything else falls back to scanning the raw text for `ses_`.
pub fn extract_session_id(output: &str) -> Option<String> {
    let structured = serde_json::from_str::<Value>(output.trim())
        .ok()
        .and_then(|value| structured_session_id(&value));
    structured.or_else(|| scan_session_id(output))
}

/// Finds the session id carried by a backend message reply body.
///
/// A JSON body is read through its structured fields only, since its text
/// parts are assistant prose that may mention unrelated sessions. Only a body
/// that is not JSON falls back to the `ses_` text scan.
pub fn extract_reply_session_id(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(value) => structured_session_id(&value),
        Err(_) => scan_session_id(body),
    }
}

fn structured_session_id(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(session_id_field),
        Value::Object(_) => session_id_field(value),
        _ => None,
    }
}

fn session_id_field(value: &Value) -> Option<String> {
    [
        value.get("session_id"),
        value.get("sessionID"),
        value.get("info").and_then(|info| info.get("sessionID")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|candidate| candidate.starts_with(SESSION_ID_PREFIX))
    .map(str::to_string)
}

fn scan_session_id(output: &str) -> Option<String> {
    let start = output.find(SESSION_ID_PREFIX)?;
    let tail = &output[start..];
    let end = tail
        .find(|ch: char| ch.is_whitespace())
        .unwrap_or(tail.len());
    Some(tail[..end].to_string())
}

/// Renders backend output for chat, truncating long output and appending the
/// session footer when a session id is known.
pub fn format_output(output: &str, session_id: Option<&str>) -> String {
    let mut rendered = if output.trim().is_empty() {
        EMPTY_OUTPUT_TEXT.to_string()
    } else {
        truncate_with_marker(
            output,
            MAX_OUTPUT_CHARS,
            TRUNCATED_OUTPUT_CHARS,
            TRUNCATION_MARKER,
        )
    };
    if let Some(session_id) = session_id.map(str::trim).filter(|id| !id.is_empty()) {
        rendered.push_str(&format!("\n\n{SESSION_FOOTER_LABEL} {session_id}"));
    }
    rendered
}
