//! Polling coordinator: one fetch-and-derive pass per interval tick.
//!
//! A coordinator owns the poll loop for one account. Each cycle obtains a
//! valid token, fetches device list + activity + geofences concurrently,
//! derives per-device state and geofence containment, classifies new watch
//! messages, and publishes the result atomically to the observer. Cycles
//! never overlap: a tick that fires while a cycle is still running is
//! skipped, not queued.
//!
//! Failure policy: a failed cycle leaves the previous snapshot in place and
//! the next tick starts fresh; there is no cross-cycle retry queue. The one
//! terminal condition is a dead refresh token
//! ([`ApiError::ReauthRequired`]), which stops the loop until the host
//! supplies new credentials.

pub mod dedup;
pub mod geofence;
pub mod state;

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::client::AnioApiClient;
use crate::api::error::ApiError;
use crate::api::models::{ChatMessage, Device, Geofence, LocationInfo};
use crate::config::PollingConfig;
use crate::observer::CoordinatorObserver;
use crate::traits::HttpClient;

pub use dedup::{MessageCursor, MessageDeduplicator};
pub use state::{AccountSnapshot, DeviceState, MessageEvent};

/// Where the coordinator currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Between cycles, waiting for the next tick.
    Idle,
    /// A cycle is in flight.
    Polling,
    /// The refresh token is dead. No further polls are scheduled until the
    /// host re-authenticates.
    AuthFailed,
}

/// Read-only access to the most recent snapshot, shareable with consumers.
#[derive(Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Option<Arc<AccountSnapshot>>>>,
}

impl SnapshotHandle {
    /// The last published snapshot, if any cycle has succeeded yet.
    pub fn latest(&self) -> Option<Arc<AccountSnapshot>> {
        self.inner.read().expect("snapshot lock poisoned").clone()
    }

    fn publish(&self, snapshot: Arc<AccountSnapshot>) {
        *self.inner.write().expect("snapshot lock poisoned") = Some(snapshot);
    }
}

/// Orchestrates poll cycles for one account.
pub struct PollingCoordinator<C> {
    client: AnioApiClient<C>,
    config: PollingConfig,
    observer: Arc<dyn CoordinatorObserver>,
    dedup: MessageDeduplicator,
    phase: CoordinatorPhase,
    /// Last successfully fetched geofence definitions, retained when a
    /// later fetch degrades.
    geofences: Vec<Geofence>,
    /// Newest activity timestamp per device, carried across cycles.
    last_seen: HashMap<String, DateTime<Utc>>,
    /// Last known location per device, keyed with the activity timestamp
    /// that produced it.
    locations: HashMap<String, (DateTime<Utc>, LocationInfo)>,
    /// Activity-feed watermark of the last successful cycle.
    watermark: Option<DateTime<Utc>>,
    snapshot: SnapshotHandle,
}

impl<C: HttpClient> PollingCoordinator<C> {
    pub fn new(
        client: AnioApiClient<C>,
        config: PollingConfig,
        observer: Arc<dyn CoordinatorObserver>,
    ) -> Self {
        Self {
            client,
            config,
            observer,
            dedup: MessageDeduplicator::new(),
            phase: CoordinatorPhase::Idle,
            geofences: Vec::new(),
            last_seen: HashMap::new(),
            locations: HashMap::new(),
            watermark: None,
            snapshot: SnapshotHandle::default(),
        }
    }

    /// Resume message cursors persisted by the host, so a restart does not
    /// re-emit already-handled messages.
    pub fn with_message_cursors(mut self, cursors: HashMap<String, MessageCursor>) -> Self {
        self.dedup = MessageDeduplicator::restore(cursors);
        self
    }

    /// Handle for reading the latest snapshot from outside the poll task.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    /// Run one complete poll cycle.
    ///
    /// On failure the previous snapshot stays published; on
    /// [`ApiError::ReauthRequired`] the coordinator enters
    /// [`CoordinatorPhase::AuthFailed`].
    pub async fn poll_once(&mut self) -> Result<(), ApiError> {
        self.phase = CoordinatorPhase::Polling;
        let result = self.run_cycle().await;
        match &result {
            Ok(()) => {
                self.phase = CoordinatorPhase::Idle;
            }
            Err(err @ ApiError::ReauthRequired(_)) => {
                self.phase = CoordinatorPhase::AuthFailed;
                warn!(
                    account = %self.config.account_id,
                    "credentials invalid, polling stops until re-authentication: {}", err
                );
                self.observer.on_cycle_failed(err);
            }
            Err(err) => {
                self.phase = CoordinatorPhase::Idle;
                warn!(
                    account = %self.config.account_id,
                    "poll cycle failed, keeping previous snapshot: {}", err
                );
                self.observer.on_cycle_failed(err);
            }
        }
        result
    }

    async fn run_cycle(&mut self) -> Result<(), ApiError> {
        let since = self.watermark;
        let client = &self.client;

        // The three fetches run independently; the cycle needs devices and
        // activity, while geofences may degrade.
        let (devices, activity, geofences) = tokio::join!(
            client.get_devices(),
            client.get_activity(since),
            client.get_geofences(),
        );

        let devices = devices?;
        let activity = activity?;
        match geofences {
            Ok(fences) => self.geofences = fences,
            Err(err @ ApiError::ReauthRequired(_)) => return Err(err),
            Err(err) => warn!(
                "geofence fetch failed, keeping previous definitions: {}",
                err
            ),
        }

        let now = Utc::now();

        // Fold the activity feed into per-device contact time, location and
        // message batches.
        let mut messages: HashMap<String, Vec<ChatMessage>> = HashMap::new();
        let mut newest = self.watermark;
        for item in &activity {
            if newest.map_or(true, |ts| item.timestamp > ts) {
                newest = Some(item.timestamp);
            }

            let seen = self.last_seen.entry(item.device_id.clone()).or_insert(item.timestamp);
            if item.timestamp > *seen {
                *seen = item.timestamp;
            }

            if let Some(mut location) = item.location() {
                if location.timestamp.is_none() {
                    location.timestamp = Some(item.timestamp);
                }
                let entry = self.locations.get(&item.device_id);
                if entry.map_or(true, |(ts, _)| item.timestamp >= *ts) {
                    self.locations
                        .insert(item.device_id.clone(), (item.timestamp, location));
                }
            }

            if let Some(message) = item.message() {
                messages.entry(message.device_id.clone()).or_default().push(message);
            }
        }
        self.watermark = newest;

        // Devices removed from the account lose their carried state and
        // their dedup cursor; a re-added device starts fresh.
        let live: HashSet<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        self.last_seen.retain(|id, _| live.contains(id.as_str()));
        self.locations.retain(|id, _| live.contains(id.as_str()));
        self.dedup.retain_devices(|id| live.contains(id));

        // Derive state and containment per device.
        let mut states = HashMap::with_capacity(devices.len());
        let mut containment = HashMap::with_capacity(devices.len());
        for device in &devices {
            let last_seen = self.last_seen.get(&device.id).copied();
            let location = self.locations.get(&device.id).map(|(_, loc)| loc.clone());

            let contained: BTreeSet<String> = match &location {
                Some(loc) => self
                    .geofences
                    .iter()
                    .filter(|fence| geofence::contains(loc.lat, loc.lon, fence))
                    .map(|fence| fence.id.clone())
                    .collect(),
                None => BTreeSet::new(),
            };

            states.insert(
                device.id.clone(),
                DeviceState::derive(device, last_seen, location, now),
            );
            containment.insert(device.id.clone(), contained);
        }

        // Classify new watch messages before anything is published, so the
        // snapshot and the event list describe the same cycle.
        let mut events = Vec::new();
        for device in &devices {
            if let Some(batch) = messages.get(&device.id) {
                for message in self.dedup.classify(&device.id, batch) {
                    events.push(MessageEvent::new(device, message));
                }
            }
        }

        let device_map: HashMap<String, Device> = devices
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();

        let snapshot = Arc::new(AccountSnapshot {
            account_id: self.config.account_id.clone(),
            taken_at: now,
            devices: device_map,
            states,
            geofences: self.geofences.clone(),
            containment,
            message_cursors: self.dedup.export(),
        });

        debug!(
            devices = snapshot.devices.len(),
            geofences = snapshot.geofences.len(),
            new_messages = events.len(),
            "poll cycle complete"
        );

        // Publish: snapshot first, then this cycle's events.
        self.snapshot.publish(snapshot.clone());
        self.observer.on_snapshot(&snapshot);
        for event in &events {
            self.observer.on_message(event);
        }

        Ok(())
    }

    /// Drive the poll loop until shutdown is signalled or authentication
    /// fails terminally.
    ///
    /// The first cycle runs immediately; afterwards one cycle runs per
    /// interval tick. Shutdown cancels any in-flight cycle at the next
    /// await point.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            account = %self.config.account_id,
            interval_secs = self.config.poll_interval().as_secs(),
            "polling started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.poll_once().await;
                    if self.phase == CoordinatorPhase::AuthFailed {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    debug!(account = %self.config.account_id, "shutdown requested");
                    break;
                }
            }
        }

        info!(account = %self.config.account_id, "polling stopped");
    }

    /// Spawn the poll loop on the current runtime.
    pub fn spawn(self) -> CoordinatorHandle
    where
        C: 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let snapshot = self.snapshot_handle();
        let join = tokio::spawn(self.run(shutdown_rx));
        CoordinatorHandle {
            shutdown: shutdown_tx,
            join,
            snapshot,
        }
    }
}

/// Controls a spawned coordinator.
pub struct CoordinatorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    snapshot: SnapshotHandle,
}

impl CoordinatorHandle {
    /// The last published snapshot.
    pub fn latest_snapshot(&self) -> Option<Arc<AccountSnapshot>> {
        self.snapshot.latest()
    }

    /// Signal shutdown and wait for the current cycle to drain.
    ///
    /// Call this before [`TokenManager::logout`] so a refresh in flight is
    /// not raced against token invalidation.
    ///
    /// [`TokenManager::logout`]: crate::api::auth::TokenManager::logout
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}
