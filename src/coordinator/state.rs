//! Derived per-cycle state published to the host.
//!
//! All values here are replace-by-value: a new snapshot supersedes the old
//! one wholesale, so consumers hold an `Arc` to an immutable value and never
//! need a lock.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::api::models::{ChatMessage, Device, Geofence, LocationInfo, MessageType, Sender};
use crate::coordinator::dedup::MessageCursor;

/// A device with no contact for longer than this is considered offline.
pub const ONLINE_THRESHOLD_SECS: i64 = 600;

/// Whether a device counts as online given when it was last seen.
pub fn is_online(last_seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_seen_at {
        Some(last_seen) => now - last_seen < Duration::seconds(ONLINE_THRESHOLD_SECS),
        None => false,
    }
}

/// Recomputed state for one device, superseded every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub device_id: String,
    /// Battery charge in percent, already clamped to [0, 100].
    pub battery_percent: u8,
    pub step_count: u32,
    /// When the watch was last heard from, if ever.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Derived: false once `last_seen_at` is older than the staleness
    /// threshold.
    pub is_online: bool,
    /// Last known position, carried over from earlier cycles when the
    /// current one brought no fix.
    pub location: Option<LocationInfo>,
}

impl DeviceState {
    /// Derive the state for a device at `now`.
    pub fn derive(
        device: &Device,
        last_seen_at: Option<DateTime<Utc>>,
        location: Option<LocationInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device.id.clone(),
            battery_percent: device.settings.battery,
            step_count: device.settings.step_count,
            last_seen_at,
            is_online: is_online(last_seen_at, now),
            location,
        }
    }
}

/// One new watch-originated chat message, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub device_id: String,
    /// Display name of the sending watch.
    pub device_name: String,
    pub message_id: String,
    pub message_type: MessageType,
    pub sender: Sender,
    pub content: String,
    pub username: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub(crate) fn new(device: &Device, message: ChatMessage) -> Self {
        Self {
            device_id: message.device_id,
            device_name: device.settings.name.clone(),
            message_id: message.id,
            message_type: message.message_type,
            sender: message.sender,
            content: message.text,
            username: message.username,
            timestamp: message.created_at,
        }
    }
}

/// The full state of an account after one successful poll cycle.
///
/// Published atomically: an observer sees either this snapshot complete or
/// the previous one, never a mix of cycles.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub taken_at: DateTime<Utc>,
    /// Identity records, replaced wholesale each cycle.
    pub devices: HashMap<String, Device>,
    /// Derived per-device state.
    pub states: HashMap<String, DeviceState>,
    /// Geofence definitions in effect for this cycle (possibly carried over
    /// from the previous one if the fetch degraded).
    pub geofences: Vec<Geofence>,
    /// For each device, the ids of the geofences currently containing it.
    pub containment: HashMap<String, BTreeSet<String>>,
    /// Dedup cursors as of this cycle, for persistence by the host.
    pub message_cursors: HashMap<String, MessageCursor>,
}

impl AccountSnapshot {
    /// Derived state for one device.
    pub fn state(&self, device_id: &str) -> Option<&DeviceState> {
        self.states.get(device_id)
    }

    /// Whether a device is currently inside a specific geofence.
    pub fn is_device_in_geofence(&self, device_id: &str, geofence_id: &str) -> bool {
        self.containment
            .get(device_id)
            .map_or(false, |fences| fences.contains(geofence_id))
    }
}
