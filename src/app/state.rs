//! Shared control state.
//!
//! One lock guards every field the power, thermal and balancing tasks
//! coordinate on.  The guard is a plain `std::sync::Mutex` and is never
//! held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::control::balancer::ProfileLevel;

/// A delayed fan-stop that has been scheduled but not yet fired.
#[derive(Debug)]
pub struct FanStopHandle {
    pub(crate) id: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) join: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct ControlState {
    /// Rig (compute load) is powered.
    pub load_energized: bool,
    /// Set when an energize sequence completes, cleared on de-energize.
    pub load_started_at: Option<Instant>,
    /// Raised by the balancer when the rig failed to boot.
    pub shutdown_requested: bool,
    /// At most one pending fan-stop.
    pub pending_fan_stop: Option<FanStopHandle>,
    /// Last level confirmed by the profile API; `None` until fetched.
    pub current_profile: Option<ProfileLevel>,
}

/// Copyable view of [`ControlState`] for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub load_energized: bool,
    pub load_started_at: Option<Instant>,
    pub shutdown_requested: bool,
    pub fan_stop_pending: bool,
    pub current_profile: Option<ProfileLevel>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<ControlState>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panicked holder cannot leave the state half-written in a way the
    /// next tick cannot tolerate, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let s = self.lock();
        StateSnapshot {
            load_energized: s.load_energized,
            load_started_at: s.load_started_at,
            shutdown_requested: s.shutdown_requested,
            fan_stop_pending: s.pending_fan_stop.is_some(),
            current_profile: s.current_profile,
        }
    }

    pub fn request_shutdown(&self) {
        self.lock().shutdown_requested = true;
    }
}
