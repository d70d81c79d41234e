//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use anio_cloud::adapters::mock::{MockHttpClient, MockResponse};
use anio_cloud::api::auth::TokenManager;
use anio_cloud::traits::{Headers, Response};
use anio_cloud::{
    AccountSnapshot, AnioApiClient, ApiError, ClientConfig, CoordinatorObserver, MessageEvent,
    SessionTokens,
};

/// Base URL used with the mock transport; never actually resolved.
pub const BASE_URL: &str = "https://api.test";

/// Initialize test logging once per process; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an unsigned JWT whose `exp` claim is `offset` from now.
pub fn make_jwt(offset: Duration) -> String {
    let exp = (Utc::now() + offset).timestamp();
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
    let signature = URL_SAFE_NO_PAD.encode("test-signature");
    format!("{}.{}.{}", header, payload, signature)
}

/// A mock 200 response with a JSON body.
pub fn ok_json(value: serde_json::Value) -> MockResponse {
    MockResponse::Success(Response::new(200, Bytes::from(value.to_string())))
}

/// A mock response with the given status and JSON body.
pub fn status_json(status: u16, value: serde_json::Value) -> MockResponse {
    MockResponse::Success(Response::new(status, Bytes::from(value.to_string())))
}

/// A mock 429 with an optional Retry-After header.
pub fn rate_limited(retry_after: Option<&str>) -> MockResponse {
    let mut headers = Headers::new();
    if let Some(secs) = retry_after {
        headers.insert("retry-after".to_string(), secs.to_string());
    }
    MockResponse::Success(Response::with_headers(429, headers, Bytes::new()))
}

/// A refresh-endpoint body carrying a fresh one-hour access token.
pub fn refresh_body(refresh_token: &str) -> serde_json::Value {
    serde_json::json!({
        "accessToken": make_jwt(Duration::hours(1)),
        "refreshToken": refresh_token,
    })
}

/// A device record as `GET /v1/device/list` returns it.
pub fn device_json(id: &str, name: &str, battery: i64, step_count: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "imei": "490154203237518",
        "config": {
            "generation": "GEN4",
            "type": "WATCH",
            "firmwareVersion": "2.1.0",
            "maxChatMessageLength": 95
        },
        "settings": {
            "name": name,
            "hexColor": "#2266ff",
            "battery": battery,
            "stepCount": step_count
        }
    })
}

/// A MESSAGE activity item wrapping a chat message.
pub fn message_activity(
    item_id: &str,
    device_id: &str,
    message_id: &str,
    text: &str,
    sender: &str,
    at: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "id": item_id,
        "deviceId": device_id,
        "type": "MESSAGE",
        "timestamp": at.to_rfc3339(),
        "data": {
            "id": message_id,
            "deviceId": device_id,
            "text": text,
            "type": "TEXT",
            "sender": sender,
            "createdAt": at.to_rfc3339()
        }
    })
}

/// A LOCATION activity item.
pub fn location_activity(
    item_id: &str,
    device_id: &str,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "id": item_id,
        "deviceId": device_id,
        "type": "LOCATION",
        "timestamp": at.to_rfc3339(),
        "data": { "lat": lat, "lng": lon, "accuracy": 10 }
    })
}

/// A geofence record.
pub fn geofence_json(id: &str, name: &str, lat: f64, lon: f64, radius: u32) -> serde_json::Value {
    serde_json::json!({ "id": id, "name": name, "lat": lat, "lng": lon, "radius": radius })
}

/// Mock transport plus a client already holding a valid session.
pub fn authed_client(mock: &Arc<MockHttpClient>) -> AnioApiClient<MockHttpClient> {
    client_with_session(mock, Duration::hours(1), "refresh-token")
}

/// Like [`authed_client`], but with control over the access token's expiry
/// offset and the refresh token.
pub fn client_with_session(
    mock: &Arc<MockHttpClient>,
    access_offset: Duration,
    refresh_token: &str,
) -> AnioApiClient<MockHttpClient> {
    let config = ClientConfig::new().with_base_url(BASE_URL);
    let auth = Arc::new(
        TokenManager::new(mock.clone(), config.clone()).with_session(SessionTokens {
            access_token: make_jwt(access_offset),
            refresh_token: refresh_token.to_string(),
        }),
    );
    AnioApiClient::new(mock.clone(), &config, auth)
}

/// Observer that records everything it is handed, including the order of
/// callbacks.
#[derive(Default)]
pub struct RecordingObserver {
    pub snapshots: Mutex<Vec<AccountSnapshot>>,
    pub messages: Mutex<Vec<MessageEvent>>,
    pub failures: Mutex<Vec<String>>,
    pub call_order: Mutex<Vec<&'static str>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn last_snapshot(&self) -> Option<AccountSnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.message_id.clone())
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }
}

impl CoordinatorObserver for RecordingObserver {
    fn on_snapshot(&self, snapshot: &AccountSnapshot) {
        self.call_order.lock().unwrap().push("snapshot");
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_message(&self, event: &MessageEvent) {
        self.call_order.lock().unwrap().push("message");
        self.messages.lock().unwrap().push(event.clone());
    }

    fn on_cycle_failed(&self, error: &ApiError) {
        self.call_order.lock().unwrap().push("failed");
        self.failures.lock().unwrap().push(error.to_string());
    }
}
