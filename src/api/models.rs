//! Wire models for the ANIO cloud API.
//!
//! Field names follow the API's camelCase JSON. Numeric fields the server
//! occasionally reports out of range (battery, step count) are normalized at
//! deserialization time so downstream code never sees an impossible value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens returned by `POST /v1/auth/login`.
///
/// When the account has 2FA enabled and no OTP code was supplied, the server
/// answers with `isOtpCodeRequired: true` and no tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "isOtpCodeRequired")]
    pub is_otp_required: bool,
}

/// Response from `POST /v1/auth/refresh-access-token`.
///
/// The server may rotate the refresh token; when it does, the new one must
/// replace the stored one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Device configuration: immutable hardware/firmware capabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub generation: String,
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
    pub firmware_version: String,
    #[serde(default = "default_max_chat_message_length")]
    pub max_chat_message_length: usize,
    #[serde(default = "default_max_phonebook_entries")]
    pub max_phonebook_entries: u32,
    #[serde(default = "default_max_geofences")]
    pub max_geofences: u32,
    #[serde(default = "default_true")]
    pub has_text_chat: bool,
    #[serde(default = "default_true")]
    pub has_voice_chat: bool,
    #[serde(default = "default_true")]
    pub has_emojis: bool,
    #[serde(default = "default_true")]
    pub has_step_counter: bool,
    #[serde(default = "default_true")]
    pub has_locating_switch: bool,
}

fn default_max_chat_message_length() -> usize {
    95
}

fn default_max_phonebook_entries() -> u32 {
    20
}

fn default_max_geofences() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_step_target() -> u32 {
    10_000
}

fn default_ring_profile() -> String {
    "RING_AND_VIBRATE".to_string()
}

/// Device settings: the user-editable portion of a device record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSettings {
    pub name: String,
    pub hex_color: String,
    #[serde(default)]
    pub phone_nr: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default = "default_step_target")]
    pub step_target: u32,
    #[serde(default, deserialize_with = "deserialize_step_count")]
    pub step_count: u32,
    #[serde(default, deserialize_with = "deserialize_battery")]
    pub battery: u8,
    #[serde(default = "default_true")]
    pub is_locating_active: bool,
    #[serde(default = "default_ring_profile")]
    pub ring_profile: String,
}

/// Clamp battery readings to [0, 100]; the server has been seen reporting
/// 255 for watches mid-boot.
fn deserialize_battery<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: i64 = Deserialize::deserialize(deserializer)?;
    Ok(value.clamp(0, 100) as u8)
}

/// Negative step counts collapse to zero.
fn deserialize_step_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: i64 = Deserialize::deserialize(deserializer)?;
    Ok(value.max(0) as u32)
}

/// Account user attached to a device record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// A watch as returned by `GET /v1/device/list`.
///
/// Identity is immutable per session; the whole record is replaced on each
/// successful device-list fetch rather than merged field by field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    pub id: String,
    pub imei: String,
    pub config: DeviceConfig,
    pub settings: DeviceSettings,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

/// Chat message payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Emoji,
    Voice,
}

/// Who sent a chat message.
///
/// `Device` is a legacy alias some firmware versions still report for
/// watch-originated messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sender {
    App,
    Watch,
    Device,
}

impl Sender {
    /// Whether the message originated on the watch side.
    pub fn is_watch_originated(self) -> bool {
        matches!(self, Sender::Watch | Sender::Device)
    }
}

/// Chat message from the ANIO API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub device_id: String,
    pub text: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender: Sender,
    #[serde(default)]
    pub is_received: bool,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Geofence definition from `GET /v1/geofence`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "deserialize_latitude")]
    pub lat: f64,
    #[serde(rename = "lng", deserialize_with = "deserialize_longitude")]
    pub lon: f64,
    #[serde(rename = "radius")]
    pub radius_meters: u32,
}

fn deserialize_latitude<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: f64 = Deserialize::deserialize(deserializer)?;
    if !(-90.0..=90.0).contains(&value) {
        return Err(serde::de::Error::custom("latitude must be between -90 and 90"));
    }
    Ok(value)
}

fn deserialize_longitude<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: f64 = Deserialize::deserialize(deserializer)?;
    if !(-180.0..=180.0).contains(&value) {
        return Err(serde::de::Error::custom(
            "longitude must be between -180 and 180",
        ));
    }
    Ok(value)
}

/// Location information embedded in LOCATION activity items.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationInfo {
    #[serde(deserialize_with = "deserialize_latitude")]
    pub lat: f64,
    #[serde(rename = "lng", deserialize_with = "deserialize_longitude")]
    pub lon: f64,
    #[serde(default)]
    pub accuracy: u32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Last-known location from `GET /v1/location/{deviceId}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLocation {
    /// `[lat, lon]` pair.
    pub position: Vec<f64>,
    pub battery_level: u8,
    pub signal_strength: i32,
    pub position_determined_by: String,
    pub date: DateTime<Utc>,
    pub last_response: DateTime<Utc>,
    #[serde(default)]
    pub speed: i32,
    #[serde(default)]
    pub direction: i32,
    pub device_id: String,
}

impl DeviceLocation {
    /// Latitude from the position array.
    pub fn latitude(&self) -> Option<f64> {
        self.position.first().copied()
    }

    /// Longitude from the position array.
    pub fn longitude(&self) -> Option<f64> {
        self.position.get(1).copied()
    }
}

/// Raw entry from the `GET /v1/activity` feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ActivityItem {
    /// Decode the payload of a `MESSAGE` item, if this is one.
    pub fn message(&self) -> Option<ChatMessage> {
        if self.kind != "MESSAGE" {
            return None;
        }
        serde_json::from_value(self.data.clone()?).ok()
    }

    /// Decode the payload of a `LOCATION` item, if this is one.
    pub fn location(&self) -> Option<LocationInfo> {
        if self.kind != "LOCATION" {
            return None;
        }
        serde_json::from_value(self.data.clone()?).ok()
    }
}
