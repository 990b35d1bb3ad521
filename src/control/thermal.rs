//! Cooling fan and battery heater.
//!
//! ## Fan
//!
//! - After a power-off the fan keeps running for a cooldown period; the
//!   stop is a cancellable task tracked in [`ControlState`].  A power-on
//!   cancels it and waits for it to finish before turning the fan on, so a
//!   stale stop can never switch off a freshly started fan.
//! - While the rig is off the enclosure is ventilated on a wall-clock
//!   cadence.  Ventilation takes the worker slot for its whole duration,
//!   so it cannot overlap a power sequence.
//!
//! ## Heater
//!
//! Plain hysteresis on the battery temperature, optionally restricted to a
//! time-of-day window (which may wrap past midnight).  Outside the window
//! the heater is forced off.
//!
//! The LM75A read is a blocking I2C transaction, so it goes through
//! [`read_battery_temp`] and never runs on a runtime worker.
//!
//! [`ControlState`]: crate::app::state::ControlState

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveTime};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::app::ports::{Actuator, Thermometer};
use crate::app::state::{FanStopHandle, SharedState};
use crate::config::{FanConfig, HeaterConfig};
use crate::error::{ConfigError, SensorError};
use crate::scheduler::Worker;

// ═══════════════════════════════════════════════════════════════
//  Fan
// ═══════════════════════════════════════════════════════════════

static NEXT_STOP_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct FanController {
    fan: Arc<dyn Actuator>,
    state: SharedState,
    worker: Worker,
    cooldown: Duration,
    ventilation: Duration,
}

impl FanController {
    pub fn new(fan: Arc<dyn Actuator>, state: SharedState, worker: Worker, cfg: &FanConfig) -> Self {
        Self {
            fan,
            state,
            worker,
            cooldown: Duration::from_secs(cfg.cooldown_minutes * 60),
            ventilation: Duration::from_secs(cfg.duration_secs),
        }
    }

    pub fn start(&self) -> crate::error::Result<()> {
        self.fan.assert_high()?;
        info!("fan ON");
        Ok(())
    }

    pub fn stop(&self) -> crate::error::Result<()> {
        self.fan.assert_low()?;
        info!("fan OFF");
        Ok(())
    }

    pub fn stop_pending(&self) -> bool {
        self.state.lock().pending_fan_stop.is_some()
    }

    /// Switch the fan off after the cooldown unless cancelled first.
    /// Returns `false` when a stop is already pending.
    pub fn schedule_stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending_fan_stop.is_some() {
            debug!("fan stop already pending");
            return false;
        }

        let id = NEXT_STOP_ID.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let fan = Arc::clone(&self.fan);
        let shared = self.state.clone();
        let delay = self.cooldown;

        // The state lock is held until the handle is stored, so the task
        // cannot clear its entry before it exists.
        let join = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!("fan stop #{} cancelled", id);
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
            match fan.assert_low() {
                Ok(()) => info!("fan OFF after {} min cooldown", delay.as_secs() / 60),
                Err(e) => error!("fan stop failed: {}", e),
            }
            let mut s = shared.lock();
            if s.pending_fan_stop.as_ref().is_some_and(|h| h.id == id) {
                s.pending_fan_stop = None;
            }
        });
        state.pending_fan_stop = Some(FanStopHandle { id, cancel, join });
        info!("fan stop scheduled in {} min", delay.as_secs() / 60);
        true
    }

    /// Cancel any pending stop and wait until its task has finished.
    pub async fn cancel_pending_stop(&self) {
        let pending = self.state.lock().pending_fan_stop.take();
        if let Some(handle) = pending {
            handle.cancel.cancel();
            if let Err(e) = handle.join.await {
                warn!("fan stop task ended abnormally: {}", e);
            }
            info!("pending fan stop cancelled");
        }
    }

    /// Forced ventilation: only with the rig off, no stop pending and the
    /// worker idle.  Returns whether the fan was run.
    pub async fn ventilate(&self) -> anyhow::Result<bool> {
        self.worker
            .try_run("ventilate", self.ventilate_now())
            .await
            .unwrap_or(Ok(false))
    }

    async fn ventilate_now(&self) -> anyhow::Result<bool> {
        {
            let s = self.state.lock();
            if s.load_energized || s.pending_fan_stop.is_some() {
                debug!("ventilation skipped (rig on or cooldown pending)");
                return Ok(false);
            }
        }
        self.start().context("ventilation: fan on")?;
        tokio::time::sleep(self.ventilation).await;
        self.stop().context("ventilation: fan off")?;
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Time-of-day window
// ═══════════════════════════════════════════════════════════════

/// `[start, end)` local time window; `start > end` wraps past midnight and
/// `start == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl HourWindow {
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            // e.g., 09:00..17:00
            t >= self.start && t < self.end
        } else {
            // e.g., 22:00..06:00 (wraps around midnight)
            t >= self.start || t < self.end
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Heater
// ═══════════════════════════════════════════════════════════════

/// Battery temperature via the blocking pool.
pub async fn read_battery_temp(thermometer: &Arc<dyn Thermometer>) -> crate::error::Result<f64> {
    let thermometer = Arc::clone(thermometer);
    tokio::task::spawn_blocking(move || thermometer.read_celsius())
        .await
        .map_err(|_| SensorError::ReadFailed)?
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeaterAction {
    /// Outside the control window; heater forced off.
    OutsideWindow,
    SwitchedOn(f64),
    SwitchedOff(f64),
    Unchanged(f64),
    /// Thermometer read failed; nothing changed.
    NoReading,
}

pub struct HeaterController {
    heater: Arc<dyn Actuator>,
    thermometer: Arc<dyn Thermometer>,
    low_c: f64,
    high_c: f64,
    window: Option<HourWindow>,
}

impl HeaterController {
    pub fn new(
        heater: Arc<dyn Actuator>,
        thermometer: Arc<dyn Thermometer>,
        cfg: &HeaterConfig,
    ) -> Result<Self, ConfigError> {
        let [low_c, high_c] = cfg.temperature_range;
        Ok(Self {
            heater,
            thermometer,
            low_c,
            high_c,
            window: cfg.window()?,
        })
    }

    /// Task body.
    pub async fn regulate(&self) -> anyhow::Result<HeaterAction> {
        self.regulate_at(Local::now().time()).await
    }

    pub async fn regulate_at(&self, now: NaiveTime) -> anyhow::Result<HeaterAction> {
        if self.window.is_some_and(|w| !w.contains(now)) {
            // Idempotent; does not depend on reading the line back.
            self.heater.assert_low().context("heater: off (outside window)")?;
            debug!("heater: outside control window, held off");
            return Ok(HeaterAction::OutsideWindow);
        }

        let on = self.heater.is_high().context("heater: read state")?;
        let temp = match read_battery_temp(&self.thermometer).await {
            Ok(t) => t,
            Err(e) => {
                warn!("heater: battery temperature unavailable: {}", e);
                return Ok(HeaterAction::NoReading);
            }
        };

        if temp < self.low_c && !on {
            self.heater.assert_high().context("heater: on")?;
            info!("heater ON ({:.1} °C < {:.1} °C)", temp, self.low_c);
            Ok(HeaterAction::SwitchedOn(temp))
        } else if temp > self.high_c && on {
            self.heater.assert_low().context("heater: off")?;
            info!("heater OFF ({:.1} °C > {:.1} °C)", temp, self.high_c);
            Ok(HeaterAction::SwitchedOff(temp))
        } else {
            debug!("heater: {:.1} °C, {}", temp, if on { "on" } else { "off" });
            Ok(HeaterAction::Unchanged(temp))
        }
    }
}
