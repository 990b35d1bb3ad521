//! Rig power sequencing.
//!
//! ```text
//!            grater_equal(on_condition)
//!   ┌─────┐ ──────────────────────────▶ ┌──────────┐ ──▶ ┌────┐
//!   │ OFF │                             │ STARTING │     │ ON │
//!   └─────┘ ◀── ┌──────────┐ ◀───────── └──────────┘     └────┘
//!               │ STOPPING │ ◀── shutdown_requested ──────┘ │
//!               └──────────┘ ◀── less_equal(off_condition) ─┘
//! ```
//!
//! Energize (inrush-limited):
//!
//! 1. precharge resistor ON, 300 ms
//! 2. load-switch coil ON, 1000 ms
//! 3. precharge resistor OFF, 4000 ms
//! 4. pulse rig power switch (300 ms)
//! 5. record start, cancel any pending fan stop, 100 ms, fan ON
//!
//! De-energize: pulse power switch, 20 s drain, coil OFF, schedule fan stop.
//!
//! STARTING and STOPPING exist only while a sequence runs; a failed
//! sequence aborts the cycle and the next tick re-evaluates.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::time::{Instant, sleep};

use super::thermal::FanController;
use super::threshold::PowerCondition;
use crate::app::ports::{Actuator, LevelSense};
use crate::app::state::SharedState;
use crate::config::{PowerConfig, SequenceTimingConfig};
use crate::drivers::relay::pulse;
use crate::telemetry::Reading;
use crate::telemetry::sampler::TelemetrySampler;
use crate::telemetry::window::WindowAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTiming {
    pub precharge: Duration,
    pub coil_settle: Duration,
    pub boot_settle: Duration,
    pub switch_pulse: Duration,
    pub fan_delay: Duration,
    pub drain: Duration,
}

impl From<&SequenceTimingConfig> for SequenceTiming {
    fn from(c: &SequenceTimingConfig) -> Self {
        Self {
            precharge: Duration::from_millis(c.precharge_ms),
            coil_settle: Duration::from_millis(c.coil_settle_ms),
            boot_settle: Duration::from_millis(c.boot_settle_ms),
            switch_pulse: Duration::from_millis(c.switch_pulse_ms),
            fan_delay: Duration::from_millis(c.fan_delay_ms),
            drain: Duration::from_millis(c.drain_ms),
        }
    }
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self::from(&SequenceTimingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not enough fast samples yet.
    NoData,
    Unchanged,
    PoweredOn,
    PoweredOff,
}

/// Output lines the sequencer drives.
#[derive(Clone)]
pub struct PowerLines {
    pub precharge_resistor: Arc<dyn Actuator>,
    pub rig_switch: Arc<dyn Actuator>,
    /// Optional rig power-sense input.
    pub rig_sense: Option<Arc<dyn LevelSense>>,
}

pub struct PowerSequencer {
    lines: PowerLines,
    load_switch: TelemetrySampler,
    fan: FanController,
    state: SharedState,
    on_condition: PowerCondition,
    off_condition: PowerCondition,
    timing: SequenceTiming,
}

impl PowerSequencer {
    pub fn new(
        lines: PowerLines,
        load_switch: TelemetrySampler,
        fan: FanController,
        state: SharedState,
        cfg: &PowerConfig,
    ) -> Self {
        Self {
            lines,
            load_switch,
            fan,
            state,
            on_condition: cfg.on_condition,
            off_condition: cfg.off_condition,
            timing: SequenceTiming::from(&cfg.timing),
        }
    }

    /// Task body: flush fast → short and act on the aggregate.
    pub async fn tick(&self, windows: &WindowAggregator) -> anyhow::Result<CycleOutcome> {
        match windows.flush_fast() {
            Some(agg) => self.run_cycle(&agg).await,
            None => {
                debug!("power: waiting for samples");
                Ok(CycleOutcome::NoData)
            }
        }
    }

    pub async fn run_cycle(&self, agg: &Reading) -> anyhow::Result<CycleOutcome> {
        self.refresh_from_sense();

        let (energized, shutdown) = {
            let s = self.state.lock();
            (s.load_energized, s.shutdown_requested)
        };
        debug!(
            "power: pv={:.1}W load={:.1}W batt={:.2}V soc={:.0}% stage={:?} energized={}",
            agg.pv_power, agg.load_power, agg.batt_voltage, agg.batt_soc, agg.stage, energized
        );

        if energized {
            if shutdown || self.off_condition.less_equal(agg) {
                if shutdown {
                    info!("power: shutdown requested");
                }
                self.power_off().await?;
                return Ok(CycleOutcome::PoweredOff);
            }
        } else {
            if shutdown {
                // Pulsing the switch now would boot the rig instead.
                info!("power: rig already off, dropping shutdown request");
                self.state.lock().shutdown_requested = false;
            }
            if self.on_condition.grater_equal(agg) {
                self.power_on().await?;
                return Ok(CycleOutcome::PoweredOn);
            }
        }
        Ok(CycleOutcome::Unchanged)
    }

    /// Reconcile `load_energized` with the sense input (the rig can be
    /// switched by hand).
    fn refresh_from_sense(&self) {
        let Some(sense) = &self.lines.rig_sense else {
            return;
        };
        match sense.is_high() {
            Ok(on) => {
                let mut s = self.state.lock();
                if s.load_energized != on {
                    warn!(
                        "power: {} reports rig {}, was {}",
                        sense.name(),
                        if on { "ON" } else { "OFF" },
                        if s.load_energized { "ON" } else { "OFF" }
                    );
                    s.load_energized = on;
                    s.load_started_at = if on { Some(Instant::now()) } else { None };
                }
            }
            Err(e) => warn!("power: {} unreadable, keeping cached state: {}", sense.name(), e),
        }
    }

    pub async fn power_on(&self) -> anyhow::Result<()> {
        info!("power: energizing load");
        let resistor = self.lines.precharge_resistor.as_ref();
        resistor.assert_high().context("power-on: precharge resistor on")?;

        if let Err(e) = self.precharge().await {
            if let Err(release) = resistor.assert_low() {
                error!("power-on: could not release precharge resistor: {}", release);
            }
            return Err(e);
        }

        sleep(self.timing.boot_settle).await;
        info!("power: pressing rig power switch");
        pulse(self.lines.rig_switch.as_ref(), self.timing.switch_pulse)
            .await
            .context("power-on: rig switch pulse")?;
        {
            let mut s = self.state.lock();
            s.load_energized = true;
            s.load_started_at = Some(Instant::now());
        }

        self.fan.cancel_pending_stop().await;
        sleep(self.timing.fan_delay).await;
        self.fan.start().context("power-on: fan on")?;
        info!("power: rig ON");
        Ok(())
    }

    async fn precharge(&self) -> anyhow::Result<()> {
        sleep(self.timing.precharge).await;
        self.load_switch
            .set_load_switch(true)
            .await
            .context("power-on: load switch on")?;
        sleep(self.timing.coil_settle).await;
        self.lines
            .precharge_resistor
            .assert_low()
            .context("power-on: precharge resistor off")?;
        Ok(())
    }

    pub async fn power_off(&self) -> anyhow::Result<()> {
        info!("power: shutting rig down");
        pulse(self.lines.rig_switch.as_ref(), self.timing.switch_pulse)
            .await
            .context("power-off: rig switch pulse")?;
        sleep(self.timing.drain).await;
        self.load_switch
            .set_load_switch(false)
            .await
            .context("power-off: load switch off")?;

        self.fan.schedule_stop();
        {
            let mut s = self.state.lock();
            s.shutdown_requested = false;
            s.load_energized = false;
            s.load_started_at = None;
        }
        info!("power: rig OFF");
        Ok(())
    }
}
