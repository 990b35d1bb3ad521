//! Charge-controller poller.
//!
//! Owns the register transport.  Serial transactions block for tens of
//! milliseconds, so every async entry point hops onto tokio's blocking
//! pool; the transport mutex keeps the sampler and the power sequencer
//! (load-switch coil) from interleaving frames on the wire.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use chrono::Utc;
use log::{debug, info};

use super::window::WindowAggregator;
use super::{
    COIL_LOAD_SWITCH, REG_BATT_SOC, REG_CHARGE_STATUS, REG_REALTIME, REG_REALTIME_COUNT, Reading,
};
use crate::app::ports::RegisterPort;
use crate::error::{Result, TransportError};

#[derive(Clone)]
pub struct TelemetrySampler {
    port: Arc<Mutex<Box<dyn RegisterPort>>>,
    unit: u8,
}

impl TelemetrySampler {
    pub fn new(port: Box<dyn RegisterPort>, unit: u8) -> Self {
        Self {
            port: Arc::new(Mutex::new(port)),
            unit,
        }
    }

    fn with_port<T>(&self, f: impl FnOnce(&mut dyn RegisterPort) -> Result<T>) -> Result<T> {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        f(port.as_mut())
    }

    // ── Blocking API ──────────────────────────────────────────

    /// One full poll: realtime block, SOC, charge status.
    pub fn sample_blocking(&self) -> Result<Reading> {
        let unit = self.unit;
        self.with_port(|p| {
            let realtime = p.read_input_registers(unit, REG_REALTIME, REG_REALTIME_COUNT)?;
            let soc = first(&p.read_input_registers(unit, REG_BATT_SOC, 1)?)?;
            let status = first(&p.read_input_registers(unit, REG_CHARGE_STATUS, 1)?)?;
            Reading::decode(&realtime, soc, status, Utc::now())
                .ok_or_else(|| TransportError::Malformed("short realtime block").into())
        })
    }

    pub fn load_switch_blocking(&self) -> Result<bool> {
        let unit = self.unit;
        self.with_port(|p| {
            p.read_coils(unit, COIL_LOAD_SWITCH, 1)?
                .first()
                .copied()
                .ok_or_else(|| TransportError::Malformed("empty coil response").into())
        })
    }

    pub fn set_load_switch_blocking(&self, on: bool) -> Result<()> {
        let unit = self.unit;
        self.with_port(|p| p.write_coil(unit, COIL_LOAD_SWITCH, on))
    }

    // ── Async API ─────────────────────────────────────────────

    async fn blocking<T: Send + 'static>(
        &self,
        f: impl FnOnce(Self) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| TransportError::Io(format!("blocking task: {e}")))?
    }

    pub async fn sample(&self) -> Result<Reading> {
        self.blocking(|s| s.sample_blocking()).await
    }

    pub async fn load_switch(&self) -> Result<bool> {
        self.blocking(|s| s.load_switch_blocking()).await
    }

    pub async fn set_load_switch(&self, on: bool) -> Result<()> {
        self.blocking(move |s| s.set_load_switch_blocking(on)).await?;
        info!("load switch -> {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    /// Sampler task body: poll once and feed the fast window.
    pub async fn sample_into(&self, windows: &WindowAggregator) -> anyhow::Result<()> {
        let r = self.sample().await.context("poll charge controller")?;
        debug!(
            "sample: pv={:.2}W load={:.2}W batt={:.2}V soc={:.0}% stage={:?}",
            r.pv_power, r.load_power, r.batt_voltage, r.batt_soc, r.stage
        );
        windows.push_sample(r);
        Ok(())
    }
}

fn first(regs: &[u16]) -> Result<u16> {
    regs.first()
        .copied()
        .ok_or_else(|| TransportError::Malformed("empty register response").into())
}
