//! anio-cloud - client and polling coordinator for the ANIO smartwatch cloud
//!
//! This crate is the resilient core between a host application and the ANIO
//! REST API: it authenticates (with 2FA support), keeps the access token
//! fresh, polls device and activity state on an interval, derives
//! online/offline status and geofence containment, deduplicates incoming
//! chat messages, and hands the host an immutable snapshot plus discrete
//! message events after every cycle.
//!
//! The host supplies credentials and a polling interval and implements
//! [`CoordinatorObserver`]; everything else (UI, persistence, presentation)
//! stays on the host side.
//!
//! ```ignore
//! use anio_cloud::{
//!     AnioApiClient, ClientConfig, CoordinatorObserver, LoginOutcome,
//!     PollingConfig, PollingCoordinator, TokenManager,
//! };
//! use anio_cloud::adapters::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new());
//! let config = ClientConfig::new();
//! let auth = Arc::new(TokenManager::new(http.clone(), config.clone()));
//!
//! match auth.login("parent@example.com", "secret", None).await? {
//!     LoginOutcome::Authenticated(_) => {}
//!     LoginOutcome::OtpRequired => { /* prompt for the code, login again */ }
//! }
//!
//! let client = AnioApiClient::new(http, &config, auth);
//! let coordinator = PollingCoordinator::new(
//!     client,
//!     PollingConfig::new("account-1").with_scan_interval_secs(120),
//!     Arc::new(MyObserver),
//! );
//! let handle = coordinator.spawn();
//! ```

pub mod adapters;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod observer;
pub mod traits;

pub use api::auth::{LoginOutcome, TokenListener, TokenManager, TokenPair};
pub use api::client::AnioApiClient;
pub use api::error::ApiError;
pub use api::models::{
    ActivityItem, ChatMessage, Device, DeviceLocation, Geofence, LocationInfo, MessageType, Sender,
};
pub use config::{ClientConfig, PollingConfig, SessionTokens};
pub use coordinator::{
    AccountSnapshot, CoordinatorHandle, CoordinatorPhase, DeviceState, MessageCursor,
    MessageEvent, PollingCoordinator, SnapshotHandle,
};
pub use observer::CoordinatorObserver;
