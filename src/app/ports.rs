//! Port traits — the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ control components (domain)
//! ```
//!
//! Driven adapters (serial registers, relay lines, thermometer, remote
//! APIs) implement these traits.  The control components hold them as
//! `Arc<dyn ...>` / `Box<dyn ...>`, so the core never touches hardware or
//! HTTP directly and every port can be replaced by a recording mock.
//!
//! Network-facing ports return [`BoxFuture`]s; hardware ports are
//! synchronous and short.  Long serial transactions are moved onto the
//! blocking pool by [`TelemetrySampler`](crate::telemetry::sampler::TelemetrySampler).

use core::future::Future;
use core::pin::Pin;

use chrono::{DateTime, Utc};

use crate::control::balancer::ProfileLevel;
use crate::error::Result;

/// Boxed, sendable future returned by async ports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ───────────────────────────────────────────────────────────────
// Register port (charge controller over RS485)
// ───────────────────────────────────────────────────────────────

/// Request/response register transactions against one addressed device.
pub trait RegisterPort: Send {
    fn read_input_registers(&mut self, unit: u8, start: u16, count: u16) -> Result<Vec<u16>>;

    fn read_coils(&mut self, unit: u8, start: u16, count: u16) -> Result<Vec<bool>>;

    fn write_coil(&mut self, unit: u8, address: u16, on: bool) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Output / input lines
// ───────────────────────────────────────────────────────────────

/// A digital output driving a relay or a momentary switch.
pub trait Actuator: Send + Sync {
    /// Line label used in logs and errors.
    fn name(&self) -> &'static str;

    fn assert_high(&self) -> Result<()>;

    fn assert_low(&self) -> Result<()>;

    fn is_high(&self) -> Result<bool>;
}

/// A digital input (rig power sense).
pub trait LevelSense: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_high(&self) -> Result<bool>;
}

// ───────────────────────────────────────────────────────────────
// Temperature
// ───────────────────────────────────────────────────────────────

pub trait Thermometer: Send + Sync {
    fn read_celsius(&self) -> Result<f64>;
}

// ───────────────────────────────────────────────────────────────
// Remote services
// ───────────────────────────────────────────────────────────────

/// External rig-management API that owns the rig's power profile.
pub trait PowerProfileApi: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &'static str;

    /// Level the rig is currently running at.
    fn current_profile(&self) -> BoxFuture<'_, Result<ProfileLevel>>;

    /// Switch the rig to `level`; returns the level the service reports.
    fn apply_profile(&self, level: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>>;

    /// One notch up from `from` (saturating at High).
    fn step_up(&self, from: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>> {
        self.apply_profile(from.step_up())
    }

    /// One notch down from `from` (saturating at Low).
    fn step_down(&self, from: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>> {
        self.apply_profile(from.step_down())
    }
}

/// One upload to the telemetry channel: up to eight numeric series.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub created: DateTime<Utc>,
    /// `d1..d8`; `None` is omitted from the upload.
    pub values: [Option<f64>; 8],
    pub comment: Option<String>,
}

pub trait TelemetrySink: Send + Sync {
    fn send(&self, record: TelemetryRecord) -> BoxFuture<'_, Result<()>>;
}
