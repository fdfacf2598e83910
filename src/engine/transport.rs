//! Transport — the thin HTTPS client.
//!
//! Posts `{query, variables}` to the configured GraphQL endpoint, attaches
//! bearer auth, and enforces a per-request deadline. Never interprets
//! response semantics — that's [`crate::engine::retry::RetryController`]'s
//! job. Raw body bytes are always preserved, even for a malformed response,
//! so the caller can report on it.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// A transport-layer failure, distinguished by what phase of the request
/// it interrupted.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("DNS or connect failure: {0}")]
    Connect(String),
    #[error("TLS failure: {0}")]
    Tls(String),
    #[error("request timed out")]
    Timeout,
    #[error("write error: {0}")]
    Write(String),
    #[error("connection closed with a partial body: {0}")]
    Eof(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Eof(err.to_string())
        } else if err.is_request() {
            Self::Write(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

/// The full response, retained so the retry controller and parser can
/// inspect status, headers, and raw bytes without re-issuing the request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub retry_after: Option<String>,
    pub rate_limit_remaining: Option<String>,
    pub rate_limit_reset: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Parse the body as JSON. Malformed JSON is reported as a
    /// `serde_json::Error`, with the raw body still available on `self`
    /// for error-reporting purposes.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A thin wrapper over `reqwest::Client`, configured once per fetch.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    endpoint: Url,
}

impl Transport {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    /// POST a single GraphQL request. Never retries; that's the caller's
    /// job via [`crate::engine::retry::RetryController`].
    pub async fn execute(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let body = serde_json::json!({ "query": query, "variables": variables });

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = resp.status();
        let header = |name: reqwest::header::HeaderName| {
            resp.headers()
                .get(&name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let retry_after = header(RETRY_AFTER);
        let rate_limit_remaining = header("x-ratelimit-remaining".parse().unwrap());
        let rate_limit_reset = header("x-ratelimit-reset".parse().unwrap());
        let content_type = header(CONTENT_TYPE);

        let body = resp.bytes().await.map_err(TransportError::from)?.to_vec();

        Ok(TransportResponse {
            status,
            retry_after,
            rate_limit_remaining,
            rate_limit_reset,
            content_type,
            body,
        })
    }
}
