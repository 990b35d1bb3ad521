//! Telemetry upload and hourly summary.
//!
//! Every 3 minutes the short window is flushed (feeding the medium window)
//! and the mean is uploaded to the Ambient channel:
//!
//! | series | value                         |
//! |--------|-------------------------------|
//! | d1     | PV power (W)                  |
//! | d2     | battery voltage (V)           |
//! | d3     | load power (W)                |
//! | d4     | power-profile code (9/11/12)  |
//! | d5     | battery temperature (°C)      |
//! | d6     | battery SOC (%)               |

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use log::{debug, info, warn};

use super::Reading;
use super::window::WindowAggregator;
use crate::app::ports::{TelemetryRecord, TelemetrySink, Thermometer};
use crate::app::state::SharedState;
use crate::control::balancer::ProfileLevel;
use crate::control::thermal::read_battery_temp;

pub struct TelemetryReporter {
    sink: Arc<dyn TelemetrySink>,
    thermometer: Option<Arc<dyn Thermometer>>,
    state: SharedState,
}

impl TelemetryReporter {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        thermometer: Option<Arc<dyn Thermometer>>,
        state: SharedState,
    ) -> Self {
        Self {
            sink,
            thermometer,
            state,
        }
    }

    /// Task body.  Returns whether anything was uploaded.
    pub async fn tick(&self, windows: &WindowAggregator) -> anyhow::Result<bool> {
        let Some(agg) = windows.flush_short() else {
            debug!("report: nothing to upload");
            return Ok(false);
        };

        let batt_temp = match &self.thermometer {
            Some(t) => match read_battery_temp(t).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("report: battery temperature unavailable: {}", e);
                    None
                }
            },
            None => None,
        };
        let profile = self.state.lock().current_profile;

        let record = build_record(&agg, profile, batt_temp);
        debug!("report: {:?}", record.values);
        self.sink.send(record).await.context("telemetry upload")?;
        Ok(true)
    }
}

pub fn build_record(
    agg: &Reading,
    profile: Option<ProfileLevel>,
    batt_temp: Option<f64>,
) -> TelemetryRecord {
    TelemetryRecord {
        created: Utc::now(),
        values: [
            Some(agg.pv_power),
            Some(agg.batt_voltage),
            Some(agg.load_power),
            profile.map(|p| f64::from(p.status_value())),
            batt_temp,
            Some(agg.batt_soc),
            None,
            None,
        ],
        comment: None,
    }
}

/// Hourly task body: flush the long window into the log.
pub fn log_hourly_summary(windows: &WindowAggregator) -> Option<Reading> {
    let agg = windows.flush_long()?;
    info!(
        "hourly: pv={:.1}W load={:.1}W surplus={:+.1}W batt={:.2}V soc={:.0}% stage={:?}",
        agg.pv_power,
        agg.load_power,
        agg.pv_power - agg.load_power,
        agg.batt_voltage,
        agg.batt_soc,
        agg.stage
    );
    Some(agg)
}
