//! Power-on / power-off threshold rules.
//!
//! A [`PowerCondition`] is a sparse rule over an aggregate reading.  Fields
//! are visited in fixed priority order (power, voltage, soc, stage); each
//! configured field overwrites the running three-way comparison until the
//! running result becomes decisive in the direction being tested.
//!
//! | test            | keeps evaluating while | passes when |
//! |-----------------|------------------------|-------------|
//! | `grater_equal`  | result ≤ 0             | result ≥ 0  |
//! | `less_equal`    | result ≥ 0             | result ≤ 0  |
//!
//! So `{soc: 90, stage: Float}` energizes once the SOC is above 90 %, or
//! whenever the stage has reached Float: a SOC at or below 90 % leaves the
//! verdict to the stage field.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::telemetry::{ChargeStage, Reading};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerCondition {
    /// Compared against PV power (W).
    pub power: Option<f64>,
    /// Battery voltage (V).
    pub voltage: Option<f64>,
    /// Battery state of charge (%).
    pub soc: Option<f64>,
    pub stage: Option<ChargeStage>,
}

fn cmp_f64(actual: f64, threshold: f64) -> i8 {
    match actual.partial_cmp(&threshold) {
        Some(Ordering::Greater) => 1,
        Some(Ordering::Less) => -1,
        _ => 0,
    }
}

impl PowerCondition {
    pub fn is_empty(&self) -> bool {
        self.power.is_none() && self.voltage.is_none() && self.soc.is_none() && self.stage.is_none()
    }

    /// Per-field comparisons of `r` against the configured thresholds, in
    /// priority order; unconfigured fields yield `None`.
    fn comparisons(&self, r: &Reading) -> [Option<i8>; 4] {
        [
            self.power.map(|t| cmp_f64(r.pv_power, t)),
            self.voltage.map(|t| cmp_f64(r.batt_voltage, t)),
            self.soc.map(|t| cmp_f64(r.batt_soc, t)),
            self.stage
                .map(|t| (i16::from(r.stage.priority()) - i16::from(t.priority())).signum() as i8),
        ]
    }

    /// Whether `r` is at or above this rule.
    pub fn grater_equal(&self, r: &Reading) -> bool {
        let mut result = 0i8;
        for cmp in self.comparisons(r).into_iter().flatten() {
            if result <= 0 {
                result = cmp;
            }
        }
        result >= 0
    }

    /// Whether `r` is at or below this rule.
    pub fn less_equal(&self, r: &Reading) -> bool {
        let mut result = 0i8;
        for cmp in self.comparisons(r).into_iter().flatten() {
            if result >= 0 {
                result = cmp;
            }
        }
        result <= 0
    }
}
