//! Typed client for the ANIO cloud API.
//!
//! Wraps the [`HttpGateway`] with the concrete endpoint surface. Every call
//! obtains a valid access token from the [`TokenManager`] first; if the
//! server still rejects the token (401), the client refreshes once and
//! retries the call exactly once before giving up.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::auth::TokenManager;
use crate::api::error::ApiError;
use crate::api::gateway::{HttpGateway, HttpMethod};
use crate::api::models::{ActivityItem, ChatMessage, Device, DeviceLocation, Geofence};
use crate::config::ClientConfig;
use crate::traits::HttpClient;

/// Emoji codes the watches understand.
pub const VALID_EMOJI_CODES: [&str; 12] = [
    "E01", "E02", "E03", "E04", "E05", "E06", "E07", "E08", "E09", "E10", "E11", "E12",
];

/// Client for the ANIO Cloud API.
pub struct AnioApiClient<C> {
    gateway: HttpGateway<C>,
    auth: Arc<TokenManager<C>>,
}

impl<C: HttpClient> AnioApiClient<C> {
    pub fn new(http: Arc<C>, config: &ClientConfig, auth: Arc<TokenManager<C>>) -> Self {
        Self {
            gateway: HttpGateway::new(http, config),
            auth,
        }
    }

    /// The token manager this client authenticates with.
    pub fn auth(&self) -> &Arc<TokenManager<C>> {
        &self.auth
    }

    /// Make an authenticated request, refreshing the token and retrying
    /// exactly once if the server rejects it.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let token = self.auth.ensure_valid_token().await?;
        match self.gateway.request(method, path, body, &token).await {
            Err(ApiError::Auth(reason)) => {
                debug!("access token rejected ({}), refreshing and retrying once", reason);
                let token = self.auth.refresh_after_rejection(&token).await?;
                self.gateway.request(method, path, body, &token).await
            }
            other => other,
        }
    }

    /// Get all devices for the authenticated user.
    ///
    /// `GET /v1/device/list`
    pub async fn get_devices(&self) -> Result<Vec<Device>, ApiError> {
        let data = self
            .request(HttpMethod::Get, "/v1/device/list", None)
            .await?;
        match data {
            Some(value @ serde_json::Value::Array(_)) => serde_json::from_value(value)
                .map_err(|e| ApiError::InvalidResponse(format!("device list: {}", e))),
            _ => Ok(Vec::new()),
        }
    }

    /// Get a specific device.
    ///
    /// `GET /v1/device/{id}`
    pub async fn get_device(&self, device_id: &str) -> Result<Device, ApiError> {
        let path = format!("/v1/device/{}", device_id);
        let data = self
            .request(HttpMethod::Get, &path, None)
            .await
            .map_err(|e| tag_device(e, device_id))?;
        let value = data.ok_or_else(|| ApiError::InvalidResponse("empty device record".into()))?;
        serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Request a location update from a device.
    ///
    /// `POST /v1/device/{id}/find`
    pub async fn find_device(&self, device_id: &str) -> Result<(), ApiError> {
        let path = format!("/v1/device/{}/find", device_id);
        self.request(HttpMethod::Post, &path, None)
            .await
            .map_err(|e| tag_device(e, device_id))?;
        debug!(device_id, "location request sent");
        Ok(())
    }

    /// Power off a device.
    ///
    /// `POST /v1/device/{id}/poweroff`
    pub async fn power_off_device(&self, device_id: &str) -> Result<(), ApiError> {
        let path = format!("/v1/device/{}/poweroff", device_id);
        self.request(HttpMethod::Post, &path, None)
            .await
            .map_err(|e| tag_device(e, device_id))?;
        info!(device_id, "power off command sent");
        Ok(())
    }

    /// Send a text message to a device.
    ///
    /// `POST /v1/chat/message/text`
    ///
    /// The message is validated against `max_length` (the device's
    /// `maxChatMessageLength`) before any HTTP call is made; an over-long
    /// message fails with [`ApiError::Validation`].
    pub async fn send_text_message(
        &self,
        device_id: &str,
        text: &str,
        username: Option<&str>,
        max_length: usize,
    ) -> Result<ChatMessage, ApiError> {
        let length = text.chars().count();
        if length > max_length {
            return Err(ApiError::Validation(format!(
                "message too long: {} characters (max {})",
                length, max_length
            )));
        }

        let payload = chat_payload(device_id, text, username);
        let data = self
            .request(HttpMethod::Post, "/v1/chat/message/text", Some(&payload))
            .await?;
        decode_message(data)
    }

    /// Send an emoji message to a device.
    ///
    /// `POST /v1/chat/message/emoji`
    ///
    /// `emoji_code` must be one of `E01`–`E12`.
    pub async fn send_emoji_message(
        &self,
        device_id: &str,
        emoji_code: &str,
        username: Option<&str>,
    ) -> Result<ChatMessage, ApiError> {
        if !VALID_EMOJI_CODES.contains(&emoji_code) {
            return Err(ApiError::Validation(format!(
                "invalid emoji code: {} (valid codes are E01-E12)",
                emoji_code
            )));
        }

        let payload = chat_payload(device_id, emoji_code, username);
        let data = self
            .request(HttpMethod::Post, "/v1/chat/message/emoji", Some(&payload))
            .await?;
        decode_message(data)
    }

    /// Get the activity feed, optionally starting at `from`.
    ///
    /// `GET /v1/activity?from=<ISO8601>`
    ///
    /// Entries that fail to parse are skipped rather than failing the whole
    /// feed; the server occasionally ships item types this client does not
    /// know.
    pub async fn get_activity(
        &self,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActivityItem>, ApiError> {
        let path = match from {
            Some(ts) => format!(
                "/v1/activity?from={}",
                ts.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => "/v1/activity".to_string(),
        };

        let data = self.request(HttpMethod::Get, &path, None).await?;
        let Some(serde_json::Value::Array(entries)) = data else {
            return Ok(Vec::new());
        };

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<ActivityItem>(entry) {
                Ok(item) => items.push(item),
                Err(err) => debug!("failed to parse activity item: {}", err),
            }
        }
        Ok(items)
    }

    /// Get all geofences.
    ///
    /// `GET /v1/geofence`
    ///
    /// A 404 means no geofences exist and yields an empty list. Individual
    /// entries with out-of-range coordinates are skipped with a warning so
    /// one corrupt row cannot blank every geofence.
    pub async fn get_geofences(&self) -> Result<Vec<Geofence>, ApiError> {
        let data = match self.request(HttpMethod::Get, "/v1/geofence", None).await {
            Ok(data) => data,
            Err(ApiError::DeviceNotFound { .. }) => {
                debug!("no geofences found (404 response)");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let Some(serde_json::Value::Array(entries)) = data else {
            return Ok(Vec::new());
        };

        let mut fences = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Geofence>(entry) {
                Ok(fence) => fences.push(fence),
                Err(err) => warn!("skipping invalid geofence: {}", err),
            }
        }
        Ok(fences)
    }

    /// Get the last known location of a device, if the server has one.
    ///
    /// `GET /v1/location/{deviceId}`
    pub async fn get_last_location(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceLocation>, ApiError> {
        let path = format!("/v1/location/{}", device_id);
        let data = match self.request(HttpMethod::Get, &path, None).await {
            Ok(data) => data,
            Err(ApiError::DeviceNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        match data {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ApiError::InvalidResponse(e.to_string())),
            None => Ok(None),
        }
    }
}

fn chat_payload(device_id: &str, text: &str, username: Option<&str>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "deviceId": device_id,
        "text": text,
    });
    if let Some(name) = username {
        payload["username"] = serde_json::Value::String(name.to_string());
    }
    payload
}

fn decode_message(data: Option<serde_json::Value>) -> Result<ChatMessage, ApiError> {
    let value = data.ok_or_else(|| ApiError::InvalidResponse("empty message record".into()))?;
    serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Attach the concrete device id to a 404 raised below the typed layer.
fn tag_device(err: ApiError, device_id: &str) -> ApiError {
    match err {
        ApiError::DeviceNotFound { .. } => ApiError::DeviceNotFound {
            device_id: device_id.to_string(),
        },
        other => other,
    }
}
