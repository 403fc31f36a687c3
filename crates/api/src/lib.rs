//! HTTP client utilities for the sales pipeline stage functions.
//!
//! This module provides a lightweight client for calling the deployed stage
//! functions. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Attaching an optional identity token as a bearer credential
//! - Validating configured base URLs for safety
//! - Posting JSON bodies with a per-call timeout
//!
//! The primary entry point is [`PipelineClient`]. Create an instance via
//! [`PipelineClient::new`], and then call [`PipelineClient::post_json`].
//!
//! # Example
//!
//! ```ignore
//! use salesflow_api::PipelineClient;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), salesflow_api::ClientError> {
//! let client = PipelineClient::new(None)?;
//! let response = client
//!     .post_json(
//!         "https://us-central1-demo.cloudfunctions.net/extract-sales-data",
//!         &serde_json::json!({"execution_date": "2024-01-15"}),
//!         Duration::from_secs(300),
//!     )
//!     .await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use std::{env, time::Duration};

use reqwest::{Client, StatusCode, header};
use salesflow_util::redact_sensitive;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Hostnames allowed over plain HTTP, for local function emulators.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Errors raised while building the client or performing a call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("identity token contains characters that are not valid in a header")]
    InvalidToken,

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Status and raw text of a stage response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub text: String,
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for stage function calls.
///
/// The underlying client is cheap to clone and safe to share between
/// concurrent runs.
pub struct PipelineClient {
    http: Client,
    user_agent: String,
}

impl PipelineClient {
    /// Construct a client, optionally authenticating every call with `auth_token`.
    pub fn new(auth_token: Option<&str>) -> Result<Self, ClientError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = auth_token.map(str::trim).filter(|token| !token.is_empty()) {
            let mut value =
                header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ClientError::InvalidToken)?;
            value.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            user_agent: format!("salesflow/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// POST `body` as JSON to `url`, waiting at most `timeout` for the whole exchange.
    ///
    /// Non-2xx responses are returned as-is; interpreting them is up to the caller.
    pub async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<RawResponse, ClientError> {
        debug!(url = %redact_sensitive(url), timeout_secs = timeout.as_secs(), "posting stage request");

        let response = self
            .http
            .post(url)
            .header(header::USER_AGENT, &self.user_agent)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|error| classify_error(url, timeout, error))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| classify_error(url, timeout, error))?;
        debug!(url = %redact_sensitive(url), status = status.as_u16(), bytes = text.len(), "received stage response");

        Ok(RawResponse { status, text })
    }
}

fn classify_error(url: &str, timeout: Duration, error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        ClientError::Network {
            url: url.to_string(),
            source: error,
        }
    }
}

/// Validate that a base URL is acceptable for stage calls.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
/// - query strings and fragments are rejected since function names are appended
pub fn validate_base_url(base: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };

    let parsed_base_url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| invalid("base URL must include a host".into()))?;

    if parsed_base_url.query().is_some() || parsed_base_url.fragment().is_some() {
        return Err(invalid("base URL must not carry a query string or fragment".into()));
    }

    let is_local = LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed));
    if !is_local && parsed_base_url.scheme() != "https" {
        return Err(invalid(format!(
            "must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    Ok(parsed_base_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn base_url_rules() {
        assert!(validate_base_url("https://us-central1-demo.cloudfunctions.net").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://127.0.0.1:8080/functions").is_ok());

        let error = validate_base_url("http://functions.example.com").unwrap_err();
        assert!(error.to_string().contains("must use https"));
        assert!(validate_base_url("https://example.com?x=1").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn rejects_tokens_with_newlines() {
        let error = PipelineClient::new(Some("abc\ndef")).unwrap_err();
        assert!(matches!(error, ClientError::InvalidToken));
    }

    #[tokio::test]
    async fn posts_json_with_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/extract-sales-data")
            .match_header("authorization", "Bearer test-token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"execution_date": "2024-01-15"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","records_processed":12}"#)
            .create_async()
            .await;

        let client = PipelineClient::new(Some("test-token")).unwrap();
        let response = client
            .post_json(
                &format!("{}/extract-sales-data", server.url()),
                &json!({"execution_date": "2024-01-15"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.text.contains("records_processed"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_statuses_are_returned_not_raised() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/transform-sales-data")
            .with_status(500)
            .with_body(r#"{"status":"error","error":"No records found for transformation"}"#)
            .create_async()
            .await;

        let client = PipelineClient::new(None).unwrap();
        let response = client
            .post_json(
                &format!("{}/transform-sales-data", server.url()),
                &json!({"execution_date": "2024-01-15"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let client = PipelineClient::new(None).unwrap();
        let error = client
            .post_json("http://127.0.0.1:9/extract-sales-data", &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::Network { .. } | ClientError::Timeout { .. }));
    }
}
