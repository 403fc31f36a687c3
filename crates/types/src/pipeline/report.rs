//! Typed decoding of stage responses.
//!
//! Stage functions answer with a JSON object whose `status` field is either the
//! literal `"error"` or anything else. Responses are decoded into a
//! [`StageReport`] right after each call so the step graph only ever branches on
//! a typed value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ERROR_STATUS: &str = "error";
const KNOWN_FIELDS: &[&str] = &[
    "status",
    "execution_date",
    "records_processed",
    "transformed_records",
    "total_revenue",
    "message",
];

/// Successful stage response with the fields the pipeline reads out by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_records: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stage-specific fields not modelled above, in response order.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Error stage response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_date: Option<String>,
}

impl StageFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            execution_date: None,
        }
    }
}

/// Result of one stage call, success payload or error payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StageReport {
    Succeeded(StagePayload),
    Failed(StageFailure),
}

impl StageReport {
    /// Decode a response body.
    ///
    /// Only `status == "error"` marks a failure; a missing or different status is
    /// an implicit success. Bodies that are not JSON objects cannot carry the
    /// status convention and are reported as failures.
    pub fn decode(body: Value) -> Self {
        let Value::Object(map) = body else {
            return StageReport::Failed(StageFailure::new(format!(
                "stage response is not a JSON object: {}",
                describe_json_kind(&body)
            )));
        };

        if map.get("status").and_then(Value::as_str) == Some(ERROR_STATUS) {
            return StageReport::Failed(StageFailure {
                error: read_error_text(&map),
                execution_date: read_string(&map, "execution_date"),
            });
        }

        StageReport::Succeeded(StagePayload {
            status: read_string(&map, "status"),
            execution_date: read_string(&map, "execution_date"),
            records_processed: read_u64(&map, "records_processed"),
            transformed_records: read_u64(&map, "transformed_records"),
            total_revenue: read_f64(&map, "total_revenue"),
            message: read_string(&map, "message"),
            extra: map
                .iter()
                .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageReport::Failed(_))
    }

    pub fn payload(&self) -> Option<&StagePayload> {
        match self {
            StageReport::Succeeded(payload) => Some(payload),
            StageReport::Failed(_) => None,
        }
    }

    /// JSON form stored in the execution context.
    pub fn to_value(&self) -> Value {
        let serialized = match self {
            StageReport::Succeeded(payload) => serde_json::to_value(payload),
            StageReport::Failed(failure) => {
                serde_json::to_value(failure).map(|mut value| {
                    if let Value::Object(map) = &mut value {
                        map.insert("status".into(), Value::String(ERROR_STATUS.into()));
                    }
                    value
                })
            }
        };
        serialized.unwrap_or(Value::Null)
    }
}

fn read_error_text(map: &Map<String, Value>) -> String {
    match map.get("error") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => read_string(map, "message").unwrap_or_else(|| "stage reported an error".to_string()),
        Some(other) => other.to_string(),
    }
}

fn read_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn read_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key)? {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && *value >= 0.0 && value.fract() == 0.0)
                .map(|value| value as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn read_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn describe_json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_status_decodes_to_failure() {
        let report = StageReport::decode(json!({"status": "error", "error": "timeout", "execution_date": "2024-01-15"}));
        assert_eq!(
            report,
            StageReport::Failed(StageFailure {
                error: "timeout".into(),
                execution_date: Some("2024-01-15".into()),
            })
        );
    }

    #[test]
    fn missing_status_is_implicit_success() {
        let report = StageReport::decode(json!({"records_processed": 12}));
        let payload = report.payload().expect("success payload");
        assert_eq!(payload.records_processed, Some(12));
        assert!(payload.status.is_none());
    }

    #[test]
    fn numeric_fields_tolerate_floats_and_strings() {
        let report = StageReport::decode(json!({
            "status": "success",
            "records_processed": 30.0,
            "transformed_records": "28",
            "total_revenue": "1520.75",
            "quality_checks": {"total_records": 28}
        }));
        let payload = report.payload().expect("success payload");
        assert_eq!(payload.records_processed, Some(30));
        assert_eq!(payload.transformed_records, Some(28));
        assert_eq!(payload.total_revenue, Some(1520.75));
        assert_eq!(payload.extra.get("quality_checks"), Some(&json!({"total_records": 28})));
    }

    #[test]
    fn non_object_body_is_failure() {
        let report = StageReport::decode(json!(["not", "an", "object"]));
        match report {
            StageReport::Failed(failure) => assert!(failure.error.contains("array")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn failure_without_error_field_falls_back_to_message() {
        let report = StageReport::decode(json!({"status": "error", "message": "quota exceeded"}));
        match report {
            StageReport::Failed(failure) => assert_eq!(failure.error, "quota exceeded"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn failure_value_keeps_error_status() {
        let value = StageReport::Failed(StageFailure::new("boom")).to_value();
        assert_eq!(value, json!({"status": "error", "error": "boom"}));
    }
}
