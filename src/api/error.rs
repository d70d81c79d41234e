//! Error taxonomy for the ANIO cloud API.
//!
//! Transient classes (`RateLimited`, `Connection`, `Server`) are retried
//! within the gateway's bounded policy and otherwise surface as a failed poll
//! cycle. `ReauthRequired` is terminal for the account until new credentials
//! are supplied; it is never retried automatically.

use thiserror::Error;

use crate::traits::HttpError;

/// Error body the API returns alongside non-2xx statuses:
/// `{message, error, statusCode}`.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Errors produced by the API client and polling coordinator.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Bad credentials or a rejected access token (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The refresh token is expired or invalid. Terminal: the account needs
    /// fresh credentials before any further request can succeed.
    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    /// Rate limited (HTTP 429) and the bounded backoff was exhausted.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        /// Server-suggested wait, if a Retry-After header was present.
        retry_after_secs: Option<u64>,
    },

    /// Transport failure (timeout, DNS, connection reset) after retries.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server-side failure (HTTP 5xx).
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Request rejected before any HTTP call (message too long, invalid
    /// emoji code) or by server-side validation (HTTP 400).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Device does not exist (HTTP 404).
    #[error("device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Classify a non-success HTTP status into the taxonomy.
    ///
    /// 429 is handled by the gateway's retry loop before it ever gets here,
    /// so a `RateLimited` from this path means the bounded retries ran out.
    pub(crate) fn from_status(status: u16, body: &[u8]) -> Self {
        let message = extract_message(body);
        match status {
            400 => ApiError::Validation(message),
            401 | 403 => ApiError::Auth(message),
            404 => ApiError::DeviceNotFound {
                device_id: "unknown".to_string(),
            },
            429 => ApiError::RateLimited {
                attempts: 0,
                retry_after_secs: None,
            },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    /// Convert a transport error after the gateway's retry budget is spent.
    pub(crate) fn from_transport(err: &HttpError) -> Self {
        ApiError::Connection(err.to_string())
    }

    /// Whether a later attempt could plausibly succeed.
    ///
    /// Used by the coordinator to decide between "retry next interval" and
    /// "stop polling".
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Connection(_) | ApiError::Server { .. }
        )
    }

    /// Get a user-friendly error message for display by the host.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Auth(_) => "Authentication failed. Please check your credentials.".to_string(),
            ApiError::ReauthRequired(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                secs
            ),
            ApiError::RateLimited { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ApiError::Connection(_) => {
                "Unable to reach the ANIO cloud. Please check your internet connection.".to_string()
            }
            ApiError::Server { .. } => {
                "The ANIO cloud is experiencing issues. Please try again later.".to_string()
            }
            ApiError::Validation(msg) => msg.clone(),
            ApiError::DeviceNotFound { device_id } => {
                format!("Watch '{}' was not found on this account.", device_id)
            }
            ApiError::InvalidResponse(_) => {
                "Received an invalid response from the server. Please try again.".to_string()
            }
        }
    }
}

/// Pull the human-readable message out of a standard error body, falling back
/// to the raw text.
fn extract_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}
