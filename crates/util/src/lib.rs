pub mod date_handling;
pub mod http;
pub mod path_processing;

pub use date_handling::*;
pub use path_processing::*;

use once_cell::sync::Lazy;
use regex::Regex;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r"(?i)(bearer )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s&]+)",
        r#"(?i)("[a-z0-9_]*(?:token|secret|password)"\s*:\s*)("[^"]*")"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Applied to response bodies, URLs, and header dumps before they reach logs.
///
/// ```rust
/// use salesflow_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("Authorization: Bearer abc.def"), "Authorization: <redacted>");
/// assert_eq!(redact_sensitive("https://host/fn?API_TOKEN=xyz"), "https://host/fn?API_TOKEN=<redacted>");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>")
            })
            .to_string();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::redact_sensitive;

    #[test]
    fn redacts_json_token_fields() {
        let body = r#"{"id_token": "eyJhbGci", "status": "ok"}"#;
        assert_eq!(redact_sensitive(body), r#"{"id_token": <redacted>, "status": "ok"}"#);
    }

    #[test]
    fn leaves_plain_text_alone() {
        let text = "extracted 42 records for 2024-01-15";
        assert_eq!(redact_sensitive(text), text);
    }
}
