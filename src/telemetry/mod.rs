//! Charge-controller telemetry: the reading model, register decoding and
//! the averaging pipeline built on top of it.
//!
//! ```text
//!  sampler (3 s) ──▶ fast ──▶ short ──▶ medium ──▶ long ──▶ hourly summary
//!                     │ 60 s    │ 3 min    │ 15 min   │ 60 min
//!                     ▼         ▼          ▼          ▼
//!               PowerSequencer  Reporter  LoadBalancer
//! ```

pub mod report;
pub mod sampler;
pub mod window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Register map ──────────────────────────────────────────────

/// Bulk real-time block (input registers).
pub const REG_REALTIME: u16 = 0x3100;
pub const REG_REALTIME_COUNT: u16 = 16;
/// Battery state of charge (%).
pub const REG_BATT_SOC: u16 = 0x311A;
/// Charging equipment status word.
pub const REG_CHARGE_STATUS: u16 = 0x3201;
/// Manual load switch.
pub const COIL_LOAD_SWITCH: u16 = 2;

// ── Charge stage ──────────────────────────────────────────────

/// Battery charging stage reported by the controller.
///
/// Ordering (`priority`) is NoCharging < Boost < Equalization < Float and is
/// distinct from the wire encoding; only the priority is used for
/// relational comparisons in power conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeStage {
    NoCharging,
    Boost,
    Equalization,
    Float,
}

impl ChargeStage {
    /// Decode bits D3..D2 of the charging status register.
    pub fn from_status(raw: u16) -> Self {
        match (raw >> 2) & 0b11 {
            0 => Self::NoCharging,
            1 => Self::Float,
            2 => Self::Boost,
            _ => Self::Equalization,
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            Self::NoCharging => 0,
            Self::Boost => 1,
            Self::Equalization => 2,
            Self::Float => 3,
        }
    }
}

// ── Reading ───────────────────────────────────────────────────

/// One decoded snapshot, or the mean of a window of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// PV array power (W).
    pub pv_power: f64,
    /// Load output power (W).
    pub load_power: f64,
    /// Battery voltage (V).
    pub batt_voltage: f64,
    /// Battery state of charge (%).
    pub batt_soc: f64,
    pub stage: ChargeStage,
    pub sampled_at: DateTime<Utc>,
}

impl Reading {
    /// Decode the three register blocks of one poll.
    ///
    /// `realtime` must hold the 16 registers starting at [`REG_REALTIME`].
    pub fn decode(
        realtime: &[u16],
        soc: u16,
        charge_status: u16,
        sampled_at: DateTime<Utc>,
    ) -> Option<Self> {
        if realtime.len() < REG_REALTIME_COUNT as usize {
            return None;
        }
        let dword = |lo: usize| f64::from(realtime[lo]) + f64::from(realtime[lo + 1]) * 65536.0;
        Some(Self {
            pv_power: dword(2) / 100.0,
            load_power: dword(14) / 100.0,
            batt_voltage: f64::from(realtime[4]) / 100.0,
            batt_soc: f64::from(soc),
            stage: ChargeStage::from_status(charge_status),
            sampled_at,
        })
    }

    /// Arithmetic mean of the numeric fields; stage and timestamp are the
    /// last sample's.  `None` for an empty slice.
    pub fn mean(samples: &[Self]) -> Option<Self> {
        let last = samples.last()?;
        let n = samples.len() as f64;
        let avg = |f: fn(&Self) -> f64| samples.iter().map(f).sum::<f64>() / n;
        Some(Self {
            pv_power: avg(|r| r.pv_power),
            load_power: avg(|r| r.load_power),
            batt_voltage: avg(|r| r.batt_voltage),
            batt_soc: avg(|r| r.batt_soc),
            stage: last.stage,
            sampled_at: last.sampled_at,
        })
    }
}
