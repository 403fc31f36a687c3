//! # HTTP Response Utilities
//!
//! Helpers for turning stage function responses into JSON and for producing
//! short, log-safe previews of response bodies.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Number of characters of a response body kept in error messages and logs.
pub const BODY_PREVIEW_LIMIT: usize = 200;

/// Return a hint for status codes that usually point at configuration problems.
///
/// # Example
/// ```rust
/// use salesflow_util::http::status_error_message;
///
/// assert!(status_error_message(401).unwrap().contains("SALESFLOW_ID_TOKEN"));
/// assert!(status_error_message(404).unwrap().contains("function name"));
/// assert!(status_error_message(500).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: set SALESFLOW_ID_TOKEN to an identity token for the functions".into()),
        403 => Some("Forbidden (403). Hint: grant the invoker role on the function to the calling identity".into()),
        404 => Some("Not Found (404). Hint: check the function name, project id, and region".into()),
        _ => None,
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// Any parse error is decorated with the originating status code plus a
/// truncated, whitespace-collapsed preview of the body.
///
/// ```rust
/// use salesflow_util::http::parse_response_json_strict;
///
/// let value = parse_response_json_strict(r#"{"status": "success"}"#, None).unwrap();
/// assert_eq!(value["status"], "success");
///
/// let error = parse_response_json_strict("<html>bad gateway</html>", None).unwrap_err();
/// assert_eq!(error.body_preview(), "<html>bad gateway</html>");
/// ```
pub fn parse_response_json_strict(text: &str, status: Option<StatusCode>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        JsonParseError {
            status_note,
            source: error,
            body_preview: preview_body(text, BODY_PREVIEW_LIMIT),
        }
    })
}

/// Collapse whitespace and cut a body down to `limit` characters for display.
pub fn preview_body(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    let mut kept = 0;
    for ch in text.trim().chars() {
        if kept >= limit {
            preview.push_str("...");
            break;
        }
        if ch.is_whitespace() {
            if preview.ends_with(' ') {
                continue;
            }
            preview.push(' ');
        } else {
            preview.push(ch);
        }
        kept += 1;
    }
    preview
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    /// Truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}
