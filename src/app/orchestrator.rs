//! Orchestrator — wires components to the scheduler and owns the lifecycle.
//!
//! ```text
//!  ┌────────────┬──────────────────────┬───────────────────────────────┐
//!  │ task       │ cadence              │ body                          │
//!  ├────────────┼──────────────────────┼───────────────────────────────┤
//!  │ sample     │ fixed rate 3 s       │ poll registers → fast window  │
//!  │ power      │ fixed delay 60 s     │ fast → short, sequencer (lane)│
//!  │ report     │ every 3 min          │ short → medium, upload        │
//!  │ balance    │ fixed delay 15 min   │ medium → long, profile step   │
//!  │ summary    │ every 60 min         │ long → log                    │
//!  │ heater     │ every 10 min         │ hysteresis                    │
//!  │ ventilate  │ every 15 min         │ fan burst while off (lane)    │
//!  └────────────┴──────────────────────┴───────────────────────────────┘
//! ```
//!
//! "lane" tasks share the single-slot [`Worker`]; the delayed fan stop runs
//! outside it so a power-on can cancel it.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ports::{Actuator, LevelSense, PowerProfileApi, RegisterPort, TelemetrySink, Thermometer};
use super::state::SharedState;
use crate::config::{ScheduleConfig, SystemConfig};
use crate::control::balancer::LoadBalancer;
use crate::control::sequencer::{PowerLines, PowerSequencer};
use crate::control::thermal::{FanController, HeaterController};
use crate::error::ConfigError;
use crate::scheduler::{Cadence, Schedule, Scheduler, Worker};
use crate::telemetry::report::{TelemetryReporter, log_hourly_summary};
use crate::telemetry::sampler::TelemetrySampler;
use crate::telemetry::window::WindowAggregator;

/// How long in-flight tasks get to finish once shutdown starts.  Covers a
/// full de-energize sequence.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// GPIO lines, as claimed at startup.
#[derive(Clone)]
pub struct OutputLines {
    pub precharge_resistor: Arc<dyn Actuator>,
    pub rig_switch: Arc<dyn Actuator>,
    pub fan: Arc<dyn Actuator>,
    pub heater: Arc<dyn Actuator>,
    pub rig_sense: Option<Arc<dyn LevelSense>>,
}

impl OutputLines {
    fn outputs(&self) -> [&Arc<dyn Actuator>; 4] {
        [&self.precharge_resistor, &self.rig_switch, &self.fan, &self.heater]
    }
}

pub struct Hardware {
    pub lines: OutputLines,
    pub registers: Box<dyn RegisterPort>,
    pub thermometer: Arc<dyn Thermometer>,
}

pub struct Services {
    pub telemetry: Arc<dyn TelemetrySink>,
    pub profile: Option<Arc<dyn PowerProfileApi>>,
}

pub struct Orchestrator {
    schedule: ScheduleConfig,
    unit_id: u8,
    state: SharedState,
    windows: Arc<WindowAggregator>,
    worker: Worker,
    lines: OutputLines,
    sampler: TelemetrySampler,
    fan: FanController,
    sequencer: Arc<PowerSequencer>,
    balancer: Arc<LoadBalancer>,
    heater: Arc<HeaterController>,
    reporter: Arc<TelemetryReporter>,
    profile: Option<Arc<dyn PowerProfileApi>>,
}

impl Orchestrator {
    pub fn new(cfg: &SystemConfig, hw: Hardware, services: Services) -> Result<Self, ConfigError> {
        let state = SharedState::new();
        let worker = Worker::new();
        let windows = Arc::new(WindowAggregator::new(cfg.control.power.min_fast_samples));
        let unit_id = cfg.device.pv_controller.unit_id;
        let sampler = TelemetrySampler::new(hw.registers, unit_id);

        let fan = FanController::new(
            Arc::clone(&hw.lines.fan),
            state.clone(),
            worker.clone(),
            &cfg.control.fan,
        );
        let sequencer = PowerSequencer::new(
            PowerLines {
                precharge_resistor: Arc::clone(&hw.lines.precharge_resistor),
                rig_switch: Arc::clone(&hw.lines.rig_switch),
                rig_sense: hw.lines.rig_sense.clone(),
            },
            sampler.clone(),
            fan.clone(),
            state.clone(),
            &cfg.control.power,
        );
        let heater = HeaterController::new(
            Arc::clone(&hw.lines.heater),
            Arc::clone(&hw.thermometer),
            &cfg.control.heater,
        )?;
        let balancer = LoadBalancer::new(
            services.profile.clone(),
            state.clone(),
            &cfg.control.balancer,
        );
        let reporter = TelemetryReporter::new(
            services.telemetry,
            Some(hw.thermometer),
            state.clone(),
        );

        Ok(Self {
            schedule: cfg.schedule.clone(),
            unit_id,
            state,
            windows,
            worker,
            lines: hw.lines,
            sampler,
            fan,
            sequencer: Arc::new(sequencer),
            balancer: Arc::new(balancer),
            heater: Arc::new(heater),
            reporter: Arc::new(reporter),
            profile: services.profile,
        })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn windows(&self) -> &Arc<WindowAggregator> {
        &self.windows
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Seed state from the outside world before any task runs.
    pub async fn start(&self) {
        info!("Orchestrator: starting (charge controller unit {})", self.unit_id);

        if let Some(sense) = &self.lines.rig_sense {
            match sense.is_high() {
                Ok(true) => {
                    info!("Orchestrator: rig already running");
                    {
                        let mut s = self.state.lock();
                        s.load_energized = true;
                        s.load_started_at = Some(Instant::now());
                    }
                    if let Err(e) = self.fan.start() {
                        error!("Orchestrator: fan on failed: {}", e);
                    }
                }
                Ok(false) => info!("Orchestrator: rig is off"),
                Err(e) => warn!("Orchestrator: {} unreadable: {}", sense.name(), e),
            }
        }

        if let Some(api) = &self.profile {
            match api.current_profile().await {
                Ok(level) => {
                    info!("Orchestrator: {} profile is {}", api.name(), level);
                    self.state.lock().current_profile = Some(level);
                }
                Err(e) => warn!("Orchestrator: {} profile unknown: {}", api.name(), e),
            }
        }
    }

    /// Build the periodic task set.
    pub fn scheduler(&self, cancel: CancellationToken) -> Scheduler {
        let sc = &self.schedule;
        let mut sched = Scheduler::new(cancel);

        let sample_period = Duration::from_secs(sc.sample_interval_secs);
        let (sampler, windows) = (self.sampler.clone(), Arc::clone(&self.windows));
        sched.add(
            Schedule::new(
                "sample",
                Cadence::FixedRate {
                    initial: Duration::ZERO,
                    period: sample_period,
                },
            ),
            move || {
                let (sampler, windows) = (sampler.clone(), Arc::clone(&windows));
                async move { sampler.sample_into(&windows).await }
            },
        );

        let power_period = Duration::from_secs(sc.power_interval_secs);
        let (seq, windows, worker) = (
            Arc::clone(&self.sequencer),
            Arc::clone(&self.windows),
            self.worker.clone(),
        );
        sched.add(
            Schedule::new(
                "power",
                Cadence::FixedDelay {
                    initial: power_period,
                    period: power_period,
                },
            ),
            move || {
                let (seq, windows, worker) = (Arc::clone(&seq), Arc::clone(&windows), worker.clone());
                async move {
                    match worker.try_run("power", seq.tick(&windows)).await {
                        Some(outcome) => outcome.map(drop),
                        None => Ok(()),
                    }
                }
            },
        );

        let (reporter, windows) = (Arc::clone(&self.reporter), Arc::clone(&self.windows));
        sched.add(
            Schedule::new("report", Cadence::EveryMinutes(sc.report_every_minutes)),
            move || {
                let (reporter, windows) = (Arc::clone(&reporter), Arc::clone(&windows));
                async move { reporter.tick(&windows).await.map(drop) }
            },
        );

        let balance_period = Duration::from_secs(sc.balance_interval_secs);
        let (balancer, windows) = (Arc::clone(&self.balancer), Arc::clone(&self.windows));
        sched.add(
            Schedule::new(
                "balance",
                Cadence::FixedDelay {
                    initial: balance_period,
                    period: balance_period,
                },
            ),
            move || {
                let (balancer, windows) = (Arc::clone(&balancer), Arc::clone(&windows));
                async move { balancer.tick(&windows).await.map(drop) }
            },
        );

        let windows = Arc::clone(&self.windows);
        sched.add(
            Schedule::new("summary", Cadence::EveryMinutes(sc.summary_every_minutes)),
            move || {
                let windows = Arc::clone(&windows);
                async move {
                    log_hourly_summary(&windows);
                    Ok(())
                }
            },
        );

        let heater = Arc::clone(&self.heater);
        sched.add(
            Schedule::new("heater", Cadence::EveryMinutes(sc.heater_every_minutes)),
            move || {
                let heater = Arc::clone(&heater);
                async move { heater.regulate().await.map(drop) }
            },
        );

        let fan = self.fan.clone();
        sched.add(
            Schedule::new("ventilate", Cadence::EveryMinutes(sc.ventilate_every_minutes)),
            move || {
                let fan = fan.clone();
                async move { fan.ventilate().await.map(drop) }
            },
        );

        sched
    }

    /// Run until `cancel` fires, then shut down.
    pub async fn run(&self, cancel: CancellationToken) {
        self.start().await;
        let tasks = self.scheduler(cancel.clone()).spawn();
        info!("Orchestrator: {} tasks running", tasks.len());
        cancel.cancelled().await;
        self.shutdown(tasks).await;
    }

    /// Let in-flight tasks finish (bounded), cancel any pending fan stop
    /// and park every output low.
    pub async fn shutdown(&self, mut tasks: JoinSet<()>) {
        info!("Orchestrator: shutting down");
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Orchestrator: tasks still running after {:?}, aborting", SHUTDOWN_GRACE);
            tasks.abort_all();
        }

        self.fan.cancel_pending_stop().await;
        for line in self.lines.outputs() {
            if let Err(e) = line.assert_low() {
                error!("Orchestrator: could not park {}: {}", line.name(), e);
            }
        }
        info!("Orchestrator: outputs parked, bye");
    }
}
