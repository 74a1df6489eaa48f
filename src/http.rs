//! Shared HTTP plumbing for the service clients: a retry policy with
//! exponential backoff and a typed error that keeps the response status.
use crate::config;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status(),
            ClientError::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&config::Http::default())
    }
}

impl RetryPolicy {
    pub fn from_config(http: &config::Http) -> Self {
        Self {
            max_attempts: http.max_retries.max(1),
            base_delay: Duration::from_millis(http.retry_base_delay_ms),
            multiplier: http.retry_multiplier.max(1),
            max_delay: Duration::from_millis(http.retry_max_delay_ms),
        }
    }

    /// Delay after the given (1-indexed) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.saturating_pow(exp);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub fn build_client(http: &config::Http) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("weekly-digest/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(http.timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

/// Send a request, rebuilding it for every attempt.
///
/// 5xx/429 responses and connection-level failures are retried per `policy`.
/// Any other response, including 4xx, is handed back to the caller as is.
pub async fn send_with_retry<F>(policy: &RetryPolicy, mut build: F) -> Result<Response, ClientError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 1;
    loop {
        match build().send().await {
            Ok(res) if is_retryable_status(res.status()) => {
                let status = res.status();
                if !policy.should_retry(attempt) {
                    let body = res.text().await.unwrap_or_default();
                    return Err(ClientError::Status { status, body });
                }
                warn!(attempt, %status, url = %res.url(), "retryable response, backing off");
            }
            Ok(res) => return Ok(res),
            Err(err) if is_retryable_transport(&err) && policy.should_retry(attempt) => {
                warn!(attempt, error = %err, "request failed, backing off");
            }
            Err(err) => return Err(err.into()),
        }
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
        attempt += 1;
    }
}

/// Map a non-success response into `ClientError::Status`, keeping the body.
pub async fn ensure_success(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

pub async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
    let res = ensure_success(res).await?;
    let text = res.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::test_server::serve;
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(p.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(p.delay_for_attempt(40), Duration::from_secs(10));
        assert!(p.should_retry(4));
        assert!(!p.should_retry(5));
    }

    #[test]
    fn only_server_errors_and_throttling_are_retryable() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = serve(vec![(503, "busy"), (502, "busy"), (200, r#"{"ok":true}"#)]).await;
        let client = Client::new();
        let url = format!("{}/ping", server.url);
        let res = send_with_retry(&fast_policy(3), || client.get(&url))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(server.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = serve(vec![(404, "missing"), (200, "{}")]).await;
        let client = Client::new();
        let url = format!("{}/missing", server.url);
        let res = send_with_retry(&fast_policy(3), || client.get(&url))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let err = ensure_success(res).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(server.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_status() {
        let server = serve(vec![(500, "a"), (500, "b")]).await;
        let client = Client::new();
        let url = format!("{}/down", server.url);
        let err = send_with_retry(&fast_policy(2), || client.get(&url))
            .await
            .unwrap_err();
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn undecodable_json_is_a_decode_error() {
        let server = serve(vec![(200, "not json")]).await;
        let client = Client::new();
        let url = format!("{}/x", server.url);
        let res = send_with_retry(&fast_policy(1), || client.get(&url))
            .await
            .unwrap();
        let err = read_json::<serde_json::Value>(res).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
