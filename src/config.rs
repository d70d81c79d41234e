//! Client and polling configuration.
//!
//! The host supplies credentials, an optional persisted session, and the
//! polling interval; everything else has production defaults.

use serde::{Deserialize, Serialize};

/// Default URL for the ANIO cloud API.
pub const API_URL: &str = "https://api.anio.cloud";

/// Client identifier sent with login and refresh requests.
pub const CLIENT_ID: &str = "anio";

/// Default polling interval in seconds (5 minutes).
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

/// Minimum accepted polling interval in seconds.
pub const MIN_SCAN_INTERVAL_SECS: u64 = 60;

/// Maximum accepted polling interval in seconds.
pub const MAX_SCAN_INTERVAL_SECS: u64 = 300;

/// Connection settings for the ANIO cloud.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API.
    pub base_url: String,
    /// Client identifier for login/refresh requests.
    pub client_id: String,
    /// Stable per-installation identifier, sent with every request.
    pub app_uuid: String,
}

impl ClientConfig {
    /// Create a config against the production API with a fresh app UUID.
    ///
    /// The app UUID identifies this installation to the server; hosts that
    /// persist sessions should persist and restore it alongside the tokens.
    pub fn new() -> Self {
        Self {
            base_url: API_URL.to_string(),
            client_id: CLIENT_ID.to_string(),
            app_uuid: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Override the base URL (used by tests against a local mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Restore a persisted app UUID.
    pub fn with_app_uuid(mut self, app_uuid: impl Into<String>) -> Self {
        self.app_uuid = app_uuid.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-account polling configuration.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Opaque account identifier echoed back in every snapshot.
    pub account_id: String,
    scan_interval_secs: u64,
}

impl PollingConfig {
    /// Create a polling config with the default 5-minute interval.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
        }
    }

    /// Set the polling interval in seconds.
    ///
    /// Values outside the accepted 60–300 s range are clamped rather than
    /// rejected.
    pub fn with_scan_interval_secs(mut self, secs: u64) -> Self {
        self.scan_interval_secs = secs;
        self
    }

    /// Effective polling interval, clamped to the accepted range.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.scan_interval_secs
                .clamp(MIN_SCAN_INTERVAL_SECS, MAX_SCAN_INTERVAL_SECS),
        )
    }
}

/// The resumable part of an authenticated session.
///
/// Serializable so the host can persist it and hand it back on startup; the
/// access token's expiry is re-derived from the JWT, not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}
