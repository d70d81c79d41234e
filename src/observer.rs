//! Observer interface toward the host.
//!
//! The coordinator calls these synchronously at well-defined points of a
//! poll cycle and makes no assumption about the host's own concurrency
//! model; implementations that need to do real work should hand off to
//! their own executor.

use crate::api::error::ApiError;
use crate::coordinator::state::{AccountSnapshot, MessageEvent};

/// Receives snapshots and events from a [`PollingCoordinator`].
///
/// [`PollingCoordinator`]: crate::coordinator::PollingCoordinator
pub trait CoordinatorObserver: Send + Sync {
    /// A poll cycle completed; `snapshot` is the complete new account state.
    ///
    /// Called once per successful cycle, before any `on_message` call from
    /// the same cycle.
    fn on_snapshot(&self, snapshot: &AccountSnapshot);

    /// A new watch-originated chat message. Invoked exactly once per message
    /// per cursor lifetime.
    fn on_message(&self, event: &MessageEvent);

    /// A poll cycle failed; the previous snapshot stays in effect. The next
    /// interval tick retries unless the error was terminal
    /// ([`ApiError::ReauthRequired`]).
    fn on_cycle_failed(&self, error: &ApiError) {
        let _ = error;
    }
}
