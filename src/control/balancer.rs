//! Power-profile load balancer.
//!
//! Every 15 minutes the medium window is flushed and the rig's power
//! profile is nudged one notch toward the available solar surplus:
//!
//! ```text
//!   surplus = pv − load
//!   surplus  >  hysteresis  →  step up    (Low → Medium → High)
//!   −surplus >  hysteresis  →  step down  (High → Medium → Low)
//!   otherwise               →  hold
//! ```
//!
//! Nothing happens during the post-boot grace period.  If the rig is on
//! but drawing almost nothing, the boot is assumed to have failed and a
//! shutdown is requested for the next power cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::PowerProfileApi;
use crate::app::state::SharedState;
use crate::config::BalancerConfig;
use crate::telemetry::Reading;
use crate::telemetry::window::WindowAggregator;

// ── Profile level ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProfileLevel {
    Low,
    Medium,
    High,
}

impl ProfileLevel {
    pub const fn step_up(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    pub const fn step_down(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// Numeric code charted on the telemetry dashboard.
    pub const fn status_value(self) -> u8 {
        match self {
            Self::High => 9,
            Self::Medium => 11,
            Self::Low => 12,
        }
    }
}

impl fmt::Display for ProfileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

// ── Balancer ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    /// Medium window was empty.
    NoData,
    /// Rig not started, or started less than the grace period ago.
    Grace,
    NotEnergized,
    /// Surplus within the hysteresis band, or no profile backend.
    Hold,
    /// Already at the end of the range in the requested direction.
    AtLimit(ProfileLevel),
    Stepped { from: ProfileLevel, to: ProfileLevel },
}

pub struct LoadBalancer {
    api: Option<Arc<dyn PowerProfileApi>>,
    state: SharedState,
    hysteresis_w: f64,
    grace: Duration,
    min_load_w: f64,
}

impl LoadBalancer {
    pub fn new(
        api: Option<Arc<dyn PowerProfileApi>>,
        state: SharedState,
        cfg: &BalancerConfig,
    ) -> Self {
        Self {
            api,
            state,
            hysteresis_w: cfg.hysteresis_w,
            grace: Duration::from_secs(cfg.grace_minutes * 60),
            min_load_w: cfg.min_load_w,
        }
    }

    /// Task body: flush medium → long and balance on the result.
    pub async fn tick(&self, windows: &WindowAggregator) -> anyhow::Result<BalanceOutcome> {
        match windows.flush_medium() {
            Some(agg) => self.balance(&agg).await,
            None => Ok(BalanceOutcome::NoData),
        }
    }

    pub async fn balance(&self, agg: &Reading) -> anyhow::Result<BalanceOutcome> {
        let snap = self.state.snapshot();
        match snap.load_started_at {
            Some(t) if t.elapsed() >= self.grace => {}
            _ => return Ok(BalanceOutcome::Grace),
        }
        if !snap.load_energized {
            return Ok(BalanceOutcome::NotEnergized);
        }

        let outcome = self.adjust(agg, snap.current_profile).await;

        if agg.load_power < self.min_load_w {
            warn!(
                "balancer: rig on but load only {:.1} W (< {:.0} W), requesting shutdown",
                agg.load_power, self.min_load_w
            );
            self.state.request_shutdown();
        }
        outcome
    }

    async fn adjust(
        &self,
        agg: &Reading,
        cached: Option<ProfileLevel>,
    ) -> anyhow::Result<BalanceOutcome> {
        let surplus = agg.pv_power - agg.load_power;
        let up = if surplus > self.hysteresis_w {
            true
        } else if -surplus > self.hysteresis_w {
            false
        } else {
            debug!("balancer: surplus {:.1} W within ±{:.1} W", surplus, self.hysteresis_w);
            return Ok(BalanceOutcome::Hold);
        };
        let Some(api) = &self.api else {
            return Ok(BalanceOutcome::Hold);
        };

        let current = match cached {
            Some(level) => level,
            None => {
                let level = api
                    .current_profile()
                    .await
                    .with_context(|| format!("{}: read current profile", api.name()))?;
                self.state.lock().current_profile = Some(level);
                level
            }
        };
        let target = if up { current.step_up() } else { current.step_down() };
        if target == current {
            debug!("balancer: already at {}", current);
            return Ok(BalanceOutcome::AtLimit(current));
        }

        info!(
            "balancer: surplus {:.1} W, profile {} -> {} via {}",
            surplus,
            current,
            target,
            api.name()
        );
        let step = if up { api.step_up(current) } else { api.step_down(current) };
        let reported = step
            .await
            .with_context(|| format!("{}: set profile {}", api.name(), target))?;

        self.state.lock().current_profile = Some(reported);
        Ok(BalanceOutcome::Stepped {
            from: current,
            to: reported,
        })
    }
}
