//! System configuration parameters
//!
//! All tunable parameters for the rig controller, grouped the way the
//! deployment file is laid out:
//!
//! ```text
//! device:    serial link, I2C thermometer, GPIO line numbers
//! control:   power on/off conditions, balancer, fan, heater
//! service:   Ambient channel, one power-profile backend
//! schedule:  task cadences
//! ```
//!
//! Every field has a serde default so a deployment file only lists what it
//! changes.  Values are loaded from YAML with environment overrides
//! (`PVRIG__CONTROL__BALANCER__HYSTERESIS_W=30`) and validated before use.

use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::control::thermal::HourWindow;
use crate::control::threshold::PowerCondition;
use crate::error::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub device: DeviceConfig,
    pub control: ControlConfig,
    pub service: ServiceConfig,
    pub schedule: ScheduleConfig,
}

// ── Device ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub pv_controller: PvControllerConfig,
    pub lm75a: Lm75aConfig,
    pub gpio: GpioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PvControllerConfig {
    /// Serial device of the RS485 adapter.
    pub serial_port: String,
    pub baud_rate: u32,
    /// Modbus unit id of the charge controller.
    pub unit_id: u8,
    /// Per-transaction response deadline.
    pub timeout_ms: u64,
}

impl Default for PvControllerConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            unit_id: 1,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lm75aConfig {
    /// 7-bit I2C address (0x48..=0x4F).
    pub address: u8,
}

impl Default for Lm75aConfig {
    fn default() -> Self {
        Self { address: 0x48 }
    }
}

/// BCM line numbers of the relay board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub precharge_resistor: u8,
    pub rig_power_switch: u8,
    pub fan: u8,
    pub heater: u8,
    /// Rig power-sense input (pulled down).
    pub rig_power_sense: u8,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            precharge_resistor: 16,
            rig_power_switch: 26,
            fan: 27,
            heater: 19,
            rig_power_sense: 17,
        }
    }
}

// ── Control ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub power: PowerConfig,
    pub balancer: BalancerConfig,
    pub fan: FanConfig,
    pub heater: HeaterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Energize when the 1-minute aggregate satisfies this (≥).
    pub on_condition: PowerCondition,
    /// De-energize when the 1-minute aggregate satisfies this (≤).
    pub off_condition: PowerCondition,
    /// Fewer fast samples than this and the power cycle waits.
    pub min_fast_samples: usize,
    pub timing: SequenceTimingConfig,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            on_condition: PowerCondition {
                soc: Some(90.0),
                ..PowerCondition::default()
            },
            off_condition: PowerCondition {
                voltage: Some(23.0),
                ..PowerCondition::default()
            },
            min_fast_samples: 5,
            timing: SequenceTimingConfig::default(),
        }
    }
}

/// Energize / de-energize step delays in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceTimingConfig {
    pub precharge_ms: u64,
    pub coil_settle_ms: u64,
    pub boot_settle_ms: u64,
    pub switch_pulse_ms: u64,
    pub fan_delay_ms: u64,
    pub drain_ms: u64,
}

impl Default for SequenceTimingConfig {
    fn default() -> Self {
        Self {
            precharge_ms: 300,
            coil_settle_ms: 1000,
            boot_settle_ms: 4000,
            switch_pulse_ms: 300,
            fan_delay_ms: 100,
            drain_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Surplus/deficit (W) that must be exceeded before stepping.
    pub hysteresis_w: f64,
    /// Minutes after power-on during which the balancer stays idle.
    pub grace_minutes: u64,
    /// Aggregate load below this (W) while energized means a failed boot.
    pub min_load_w: f64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            hysteresis_w: 20.0,
            grace_minutes: 15,
            min_load_w: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    /// Minutes the fan keeps running after the rig is powered off.
    pub cooldown_minutes: u64,
    /// Seconds of forced ventilation per ventilation slot.
    pub duration_secs: u64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 10,
            duration_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaterConfig {
    /// `[low, high]` °C hysteresis band.
    pub temperature_range: [f64; 2],
    /// `["HH:MM", "HH:MM"]` local time window; empty means always.
    pub hour_range: Vec<String>,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            temperature_range: [5.0, 10.0],
            hour_range: Vec::new(),
        }
    }
}

impl HeaterConfig {
    /// Parse `hour_range` into a window, `None` when unrestricted.
    pub fn window(&self) -> Result<Option<HourWindow>, ConfigError> {
        match self.hour_range.as_slice() {
            [] => Ok(None),
            [from, to] => {
                let parse = |s: &str| {
                    NaiveTime::parse_from_str(s, "%H:%M")
                        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                        .map_err(|_| {
                            ConfigError::ValidationFailed(
                                "heater.hour_range entries must be HH:MM or HH:MM:SS",
                            )
                        })
                };
                Ok(Some(HourWindow::new(parse(from)?, parse(to)?)))
            }
            _ => Err(ConfigError::ValidationFailed(
                "heater.hour_range must have exactly two entries",
            )),
        }
    }
}

// ── Services ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub ambient: AmbientConfig,
    /// Which power-profile backend to drive.  `None` disables balancing.
    pub profile: Option<ProfileBackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub base_url: String,
    pub channel_id: u32,
    pub write_key: String,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ambidata.io".into(),
            channel_id: 0,
            write_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ProfileBackendConfig {
    Nicehash(NicehashConfig),
    Hive(HiveConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicehashConfig {
    #[serde(default = "default_nicehash_url")]
    pub base_url: String,
    pub org_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub rig_id: String,
}

fn default_nicehash_url() -> String {
    "https://api2.nicehash.com".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default = "default_hive_url")]
    pub base_url: String,
    pub farm_id: u64,
    pub worker_id: u64,
    pub personal_token: String,
    pub profiles: HiveProfileNames,
}

fn default_hive_url() -> String {
    "https://api2.hiveos.farm/api/v2".into()
}

/// OC profile names on the Hive farm for each power level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveProfileNames {
    pub low: String,
    pub medium: String,
    pub high: String,
}

// ── Schedule ──────────────────────────────────────────────────

/// Task cadences.  Wall-clock cadences are in minutes and align to the
/// local clock (`every 15` fires at :00, :15, :30, :45).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub sample_interval_secs: u64,
    pub power_interval_secs: u64,
    pub report_every_minutes: u32,
    pub balance_interval_secs: u64,
    pub summary_every_minutes: u32,
    pub heater_every_minutes: u32,
    pub ventilate_every_minutes: u32,
    /// Fixed backoff while acquiring GPIO/I2C/serial at startup.
    pub acquire_backoff_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 3,
            power_interval_secs: 60,
            report_every_minutes: 3,
            balance_interval_secs: 15 * 60,
            summary_every_minutes: 60,
            heater_every_minutes: 10,
            ventilate_every_minutes: 15,
            acquire_backoff_secs: 3,
        }
    }
}

// ── Loading / validation ──────────────────────────────────────

impl SystemConfig {
    /// Load from a YAML file, apply `PVRIG__*` environment overrides and
    /// validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix("PVRIG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: Self = raw.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make the controller oscillate or stall.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [lo, hi] = self.control.heater.temperature_range;
        if lo >= hi {
            return Err(ConfigError::ValidationFailed(
                "heater.temperature_range low must be below high",
            ));
        }
        self.control.heater.window()?;

        if self.control.balancer.hysteresis_w < 0.0 {
            return Err(ConfigError::ValidationFailed("balancer.hysteresis_w must be >= 0"));
        }
        if self.control.power.min_fast_samples == 0 {
            return Err(ConfigError::ValidationFailed("power.min_fast_samples must be > 0"));
        }

        let s = &self.schedule;
        if s.sample_interval_secs == 0
            || s.power_interval_secs == 0
            || s.balance_interval_secs == 0
            || s.acquire_backoff_secs == 0
        {
            return Err(ConfigError::ValidationFailed("schedule intervals must be > 0"));
        }
        for every in [
            s.report_every_minutes,
            s.summary_every_minutes,
            s.heater_every_minutes,
            s.ventilate_every_minutes,
        ] {
            if every == 0 || every > 24 * 60 {
                return Err(ConfigError::ValidationFailed(
                    "wall-clock cadences must be 1..=1440 minutes",
                ));
            }
        }

        if self.service.ambient.channel_id == 0 {
            return Err(ConfigError::ValidationFailed("ambient.channel_id must be set"));
        }

        match &self.service.profile {
            Some(ProfileBackendConfig::Nicehash(n))
                if n.api_key.is_empty() || n.api_secret.is_empty() || n.rig_id.is_empty() =>
            {
                Err(ConfigError::ValidationFailed(
                    "nicehash api_key, api_secret and rig_id are required",
                ))
            }
            Some(ProfileBackendConfig::Hive(h)) if h.personal_token.is_empty() => Err(
                ConfigError::ValidationFailed("hive personal_token is required"),
            ),
            _ => Ok(()),
        }
    }
}
