use std::time::Duration;

use async_trait::async_trait;
use salesflow_api::{ClientError, PipelineClient};
use salesflow_util::{
    http::{BODY_PREVIEW_LIMIT, parse_response_json_strict, preview_body, status_error_message},
    redact_sensitive,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Who an outbound call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallTarget {
    Stage(salesflow_types::Stage),
    Notification,
}

/// A fully rendered outbound POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCall {
    pub target: CallTarget,
    pub url: String,
    pub body: Value,
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(timeout.as_secs())
}

/// Transport-level failure of a call. The step graph folds these into the
/// same failure branch as an error payload.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("HTTP {status} from {url}: {body_preview}{hint}")]
    Status {
        url: String,
        status: u16,
        body_preview: String,
        hint: String,
    },

    #[error(transparent)]
    Decode(#[from] salesflow_util::http::JsonParseError),
}

/// Performs outbound calls on behalf of the step graph.
///
/// The HTTP implementation talks to deployed functions; tests provide
/// in-process implementations that script responses.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// POST `call.body` to `call.url` and return the decoded JSON response body.
    async fn invoke(&self, call: &StageCall) -> Result<Value, InvokeError>;
}

/// [`StageInvoker`] backed by [`PipelineClient`].
#[derive(Debug, Clone)]
pub struct HttpStageInvoker {
    client: PipelineClient,
}

impl HttpStageInvoker {
    pub fn new(client: PipelineClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageInvoker for HttpStageInvoker {
    async fn invoke(&self, call: &StageCall) -> Result<Value, InvokeError> {
        let response = self.client.post_json(&call.url, &call.body, call.timeout).await?;
        let parsed = parse_response_json_strict(&response.text, Some(response.status));

        // The notifier acknowledges with any 2xx; an empty or plain-text body still counts.
        if call.target == CallTarget::Notification && response.status.is_success() {
            return Ok(parsed.unwrap_or(Value::Null));
        }

        if response.status.is_success() {
            return Ok(parsed?);
        }

        // Stage functions answer failures with a 5xx and an error payload; keep those
        // so the payload's error text reaches logs and the failure notification.
        if let Ok(value) = parsed
            && value.get("status").and_then(Value::as_str) == Some("error")
        {
            debug!(url = %redact_sensitive(&call.url), status = response.status.as_u16(), "stage returned error payload");
            return Ok(value);
        }

        let status = response.status.as_u16();
        let body_preview = redact_sensitive(&preview_body(&response.text, BODY_PREVIEW_LIMIT));
        warn!(url = %redact_sensitive(&call.url), status, body = %body_preview, "stage call rejected");
        Err(InvokeError::Status {
            url: redact_sensitive(&call.url),
            status,
            body_preview,
            hint: status_error_message(status).map(|hint| format!(". {hint}")).unwrap_or_default(),
        })
    }
}
