//! `RetryController` — turns a raw transport result into a retry decision.
//!
//! Classification never raises an exception; it always returns an
//! [`Outcome`], because "give up" and "wait and try again" are both
//! perfectly normal results of talking to someone else's API.

use crate::engine::transport::{TransportError, TransportResponse};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a request is not going to be retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailureKind {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("request malformed: {0}")]
    BadRequest(String),
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    BudgetExhausted { attempts: u32, last: String },
    #[error("rate limit wait of {0:?} exceeds the configured maximum")]
    RateLimitTooLong(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote server error: {0}")]
    Remote(String),
}

/// The one-of-three result of classifying a response.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The response is usable; hand its body to the page loop.
    Accept,
    /// Wait `delay`, then retry the same request.
    RetryAfter(Duration),
    /// Stop. No further retries will help.
    Fail(FailureKind),
}

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_RATE_LIMIT_CEILING: Duration = Duration::from_secs(15 * 60);

/// Drives the attempt counter and the exponential backoff schedule for one
/// logical request (one page, possibly re-issued after a complexity-error
/// shrink by the [`crate::engine::query_planner::QueryPlanner`]).
pub struct RetryController {
    attempt: u32,
    rate_limit_ceiling: Duration,
}

impl RetryController {
    pub fn new(rate_limit_ceiling: Duration) -> Self {
        Self {
            attempt: 0,
            rate_limit_ceiling,
        }
    }

    pub fn default_ceiling() -> Duration {
        DEFAULT_RATE_LIMIT_CEILING
    }

    /// Classify a completed HTTP response. Only paths that actually consume
    /// the attempt budget advance `self.attempt` — a rate-limit wait never
    /// does, since the server is telling us to wait, not that the request
    /// itself failed.
    pub fn classify_response(&mut self, resp: &TransportResponse) -> Outcome {
        match resp.status {
            StatusCode::OK => self.classify_ok_body(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                if let Some(delay) = rate_limit_delay(resp) {
                    return self.bounded_wait(delay);
                }
                Outcome::Fail(FailureKind::Auth(format!(
                    "status {}",
                    resp.status.as_u16()
                )))
            }
            StatusCode::BAD_REQUEST => {
                Outcome::Fail(FailureKind::BadRequest(body_excerpt(&resp.body)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let delay = rate_limit_delay(resp).unwrap_or(BASE_BACKOFF);
                self.bounded_wait(delay)
            }
            status if status.is_server_error() => self.backoff_or_fail(FailureKind::Remote(
                format!("status {}", status.as_u16()),
            )),
            status => Outcome::Fail(FailureKind::Remote(format!(
                "unexpected status {}",
                status.as_u16()
            ))),
        }
    }

    /// Classify a transport-level failure (never reached the server, or the
    /// connection died mid-response).
    pub fn classify_transport_error(&mut self, err: &TransportError) -> Outcome {
        match err {
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Eof(_) => {
                self.backoff_or_fail(FailureKind::Transport(err.to_string()))
            }
            TransportError::Tls(_) | TransportError::Write(_) => {
                Outcome::Fail(FailureKind::Transport(err.to_string()))
            }
        }
    }

    fn classify_ok_body(&mut self, resp: &TransportResponse) -> Outcome {
        let body = match resp.body_json() {
            Ok(v) => v,
            Err(_) => {
                return self.backoff_or_fail(FailureKind::Remote("malformed JSON body".into()))
            }
        };

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if errors.iter().any(is_complexity_error) {
                // The query planner handles shrinking and re-issuing; this
                // is not a retryable-as-is failure.
                return Outcome::Fail(FailureKind::BadRequest(
                    "query exceeded complexity budget".into(),
                ));
            }
            if errors
                .iter()
                .any(|e| e.get("type").and_then(|t| t.as_str()) == Some("RATE_LIMITED"))
            {
                let delay = rate_limit_delay(resp).unwrap_or(BASE_BACKOFF);
                return self.bounded_wait(delay);
            }
            return Outcome::Fail(FailureKind::Remote(format!("{errors:?}")));
        }

        Outcome::Accept
    }

    fn backoff_or_fail(&mut self, kind: FailureKind) -> Outcome {
        self.attempt += 1;
        if self.attempt >= MAX_ATTEMPTS {
            return Outcome::Fail(FailureKind::BudgetExhausted {
                attempts: self.attempt,
                last: kind.to_string(),
            });
        }
        let exp = BASE_BACKOFF.saturating_mul(1 << (self.attempt.saturating_sub(1)).min(8));
        let capped = exp.min(MAX_BACKOFF);
        Outcome::RetryAfter(jittered(capped))
    }

    fn bounded_wait(&self, delay: Duration) -> Outcome {
        if delay > self.rate_limit_ceiling {
            return Outcome::Fail(FailureKind::RateLimitTooLong(delay));
        }
        Outcome::RetryAfter(delay)
    }

    /// Sleep for `delay`, racing against `token`. Returns `Err(Cancelled)`
    /// if the token fires first.
    pub async fn wait(delay: Duration, token: &CancellationToken) -> Result<(), FailureKind> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = token.cancelled() => Err(FailureKind::Cancelled),
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = fastrand::u64(0..=250);
    base + Duration::from_millis(jitter_ms)
}

fn is_complexity_error(err: &serde_json::Value) -> bool {
    err.get("type").and_then(|t| t.as_str()) == Some("MAX_NODE_LIMIT_EXCEEDED")
        || err
            .get("message")
            .and_then(|m| m.as_str())
            .is_some_and(|m| m.to_lowercase().contains("complexity"))
}

fn rate_limit_delay(resp: &TransportResponse) -> Option<Duration> {
    if let Some(raw) = &resp.retry_after {
        if let Ok(secs) = raw.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        if let Ok(when) = httpdate::parse_http_date(raw) {
            if let Ok(remaining) = when.duration_since(std::time::SystemTime::now()) {
                return Some(remaining);
            }
        }
    }
    if resp.rate_limit_remaining.as_deref() == Some("0") {
        if let Some(reset) = &resp.rate_limit_reset {
            if let Ok(epoch) = reset.parse::<u64>() {
                let now = chrono::Utc::now().timestamp() as u64;
                return Some(Duration::from_secs(epoch.saturating_sub(now)));
            }
        }
    }
    None
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status: StatusCode::OK,
            retry_after: None,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            content_type: Some("application/json".into()),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[test]
    fn accepts_clean_response() {
        let mut ctrl = RetryController::new(RetryController::default_ceiling());
        let resp = ok_response(serde_json::json!({"data": {}}));
        assert!(matches!(ctrl.classify_response(&resp), Outcome::Accept));
    }

    #[test]
    fn rate_limited_waits_within_ceiling() {
        let mut ctrl = RetryController::new(Duration::from_secs(60));
        let mut resp = TransportResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some("5".into()),
            rate_limit_remaining: None,
            rate_limit_reset: None,
            content_type: None,
            body: Vec::new(),
        };
        match ctrl.classify_response(&resp) {
            Outcome::RetryAfter(d) => assert_eq!(d, Duration::from_secs(5)),
            other => panic!("expected RetryAfter, got {other:?}"),
        }

        resp.retry_after = Some("500".into());
        match ctrl.classify_response(&resp) {
            Outcome::Fail(FailureKind::RateLimitTooLong(_)) => {}
            other => panic!("expected RateLimitTooLong, got {other:?}"),
        }
    }

    #[test]
    fn auth_failure_is_not_retried() {
        let mut ctrl = RetryController::new(RetryController::default_ceiling());
        let resp = TransportResponse {
            status: StatusCode::UNAUTHORIZED,
            retry_after: None,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            content_type: None,
            body: Vec::new(),
        };
        assert!(matches!(
            ctrl.classify_response(&resp),
            Outcome::Fail(FailureKind::Auth(_))
        ));
    }

    #[test]
    fn server_errors_exhaust_the_attempt_budget() {
        let mut ctrl = RetryController::new(RetryController::default_ceiling());
        let resp = TransportResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            retry_after: None,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            content_type: None,
            body: Vec::new(),
        };
        for _ in 0..MAX_ATTEMPTS - 1 {
            assert!(matches!(
                ctrl.classify_response(&resp),
                Outcome::RetryAfter(_)
            ));
        }
        assert!(matches!(
            ctrl.classify_response(&resp),
            Outcome::Fail(FailureKind::BudgetExhausted { .. })
        ));
    }

    #[test]
    fn complexity_error_fails_without_retry() {
        let mut ctrl = RetryController::new(RetryController::default_ceiling());
        let resp = ok_response(serde_json::json!({
            "errors": [{"type": "MAX_NODE_LIMIT_EXCEEDED", "message": "too complex"}]
        }));
        assert!(matches!(
            ctrl.classify_response(&resp),
            Outcome::Fail(FailureKind::BadRequest(_))
        ));
    }
}
