//! One logical API request with uniform error classification and retry.
//!
//! The gateway owns the retry policy for a single call:
//!
//! - 429: exponential backoff starting at 2 s, doubling per attempt, capped
//!   at 300 s, at most [`RATE_LIMIT_MAX_RETRIES`] attempts; a `Retry-After`
//!   header overrides the computed delay.
//! - transport errors: up to [`CONNECT_MAX_RETRIES`] retries with a short
//!   fixed delay, then [`ApiError::Connection`].
//! - 401: never retried here; propagated as [`ApiError::Auth`] so the typed
//!   client can refresh the token and retry exactly once.
//! - 5xx: propagated as [`ApiError::Server`]; the polling cycle's
//!   retry-next-interval semantics own anything further.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::config::ClientConfig;
use crate::traits::{Headers, HttpClient, Response};

/// Maximum retry attempts when rate limited.
pub const RATE_LIMIT_MAX_RETRIES: u32 = 5;

/// Upper bound on a single rate-limit backoff delay, in seconds.
pub const RATE_LIMIT_BACKOFF_CAP_SECS: u64 = 300;

/// Maximum retry attempts on transport errors.
pub const CONNECT_MAX_RETRIES: u32 = 3;

/// Fixed delay between transport-error retries.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP method for a gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Backoff delay for the nth rate-limit retry (1-based): 2 s, 4 s, 8 s, …,
/// capped at [`RATE_LIMIT_BACKOFF_CAP_SECS`].
pub fn rate_limit_backoff(attempt: u32) -> Duration {
    let exp = attempt.min(9);
    Duration::from_secs((1u64 << exp).min(RATE_LIMIT_BACKOFF_CAP_SECS))
}

/// Parse a `Retry-After` header as delta-seconds.
fn retry_after_secs(response: &Response) -> Option<u64> {
    response.header("retry-after")?.trim().parse().ok()
}

/// Issues authenticated requests over an injected [`HttpClient`].
pub struct HttpGateway<C> {
    http: Arc<C>,
    base_url: String,
    app_uuid: String,
}

impl<C: HttpClient> HttpGateway<C> {
    pub fn new(http: Arc<C>, config: &ClientConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            app_uuid: config.app_uuid.clone(),
        }
    }

    fn headers(&self, token: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        headers.insert("app-uuid".to_string(), self.app_uuid.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    /// Perform one logical API call.
    ///
    /// Returns `Ok(None)` for responses without a body (204 or empty 2xx),
    /// otherwise the decoded JSON value.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let headers = self.headers(token);
        let body_str = body.map(|b| b.to_string()).unwrap_or_default();

        let mut rate_attempts = 0u32;
        let mut connect_attempts = 0u32;

        loop {
            let result = match method {
                HttpMethod::Get => self.http.get(&url, &headers).await,
                HttpMethod::Post => self.http.post(&url, &body_str, &headers).await,
            };

            let response = match result {
                Ok(response) => response,
                Err(err) if err.is_retryable() => {
                    connect_attempts += 1;
                    if connect_attempts > CONNECT_MAX_RETRIES {
                        return Err(ApiError::from_transport(&err));
                    }
                    debug!(
                        attempt = connect_attempts,
                        max = CONNECT_MAX_RETRIES,
                        "transport error, retrying: {}",
                        err
                    );
                    sleep(CONNECT_RETRY_DELAY).await;
                    continue;
                }
                Err(err) => return Err(ApiError::from_transport(&err)),
            };

            if response.status == 429 {
                rate_attempts += 1;
                let retry_after = retry_after_secs(&response);
                if rate_attempts > RATE_LIMIT_MAX_RETRIES {
                    return Err(ApiError::RateLimited {
                        attempts: RATE_LIMIT_MAX_RETRIES,
                        retry_after_secs: retry_after,
                    });
                }
                let delay = retry_after
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| rate_limit_backoff(rate_attempts));
                warn!(
                    attempt = rate_attempts,
                    max = RATE_LIMIT_MAX_RETRIES,
                    "rate limited, waiting {} seconds",
                    delay.as_secs()
                );
                sleep(delay).await;
                continue;
            }

            if !response.is_success() {
                return Err(ApiError::from_status(response.status, &response.body));
            }

            if response.status == 204 || response.body.is_empty() {
                return Ok(None);
            }

            return response
                .json()
                .map(Some)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()));
        }
    }
}
