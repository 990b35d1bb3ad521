//! PvRig: Raspberry Pi entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  rpi GPIO/I2C/UART   RtuClient      AmbientClient              │
//! │  (Actuator, Sense,   (RegisterPort) (TelemetrySink)            │
//! │   Thermometer)                      Nicehash/HiveClient        │
//! │                                     (PowerProfileApi)          │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   Orchestrator: sampler · sequencer · balancer ·       │    │
//! │  │   fan/heater · reporter  (tokio Scheduler + Worker)    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use pvrig::adapters::{self, ambient::AmbientClient, rpi};
use pvrig::app::orchestrator::{Hardware, Orchestrator, Services};
use pvrig::config::SystemConfig;
use pvrig::drivers::hw_init::acquire_with_retry;

const WORKER_THREADS: usize = 5;

#[derive(Debug, Parser)]
#[command(version, about = "Solar PV compute-rig controller")]
struct Cli {
    /// YAML configuration file (overridable with PVRIG__SECTION__KEY).
    #[arg(short, long, default_value = "/etc/pvrig/pvrig.yaml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("╔══════════════════════════════════════╗");
    info!("║  PvRig v{:<29}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let cfg = SystemConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .enable_all()
        .build()
        .context("tokio runtime")?
        .block_on(run(cfg))
}

async fn run(cfg: SystemConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    // ── Hardware ──────────────────────────────────────────────
    let backoff = Duration::from_secs(cfg.schedule.acquire_backoff_secs);
    let Some(lines) = acquire_with_retry("gpio", backoff, &cancel, || {
        rpi::open_lines(&cfg.device.gpio)
    })
    .await
    else {
        return Ok(());
    };
    let Some(thermometer) = acquire_with_retry("lm75a", backoff, &cancel, || {
        rpi::open_thermometer(&cfg.device.lm75a)
    })
    .await
    else {
        return Ok(());
    };
    let Some(registers) = acquire_with_retry("charge-controller", backoff, &cancel, || {
        rpi::open_controller(&cfg.device.pv_controller)
    })
    .await
    else {
        return Ok(());
    };

    // ── Services ──────────────────────────────────────────────
    let services = Services {
        telemetry: Arc::new(AmbientClient::new(&cfg.service.ambient)?),
        profile: adapters::profile_api(cfg.service.profile.as_ref())?,
    };

    let orchestrator = Orchestrator::new(
        &cfg,
        Hardware {
            lines,
            registers: Box::new(registers),
            thermometer: Arc::new(thermometer),
        },
        services,
    )?;
    orchestrator.run(cancel).await;
    Ok(())
}

async fn watch_signals(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = ctrl_c => match res {
                        Ok(()) => info!("SIGINT received"),
                        Err(e) => warn!("SIGINT handler unavailable: {}", e),
                    },
                    _ = term.recv() => info!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                match ctrl_c.await {
                    Ok(()) => info!("SIGINT received"),
                    Err(e) => warn!("SIGINT handler unavailable: {}", e),
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        match ctrl_c.await {
            Ok(()) => info!("interrupt received"),
            Err(e) => warn!("interrupt handler unavailable: {}", e),
        }
    }
    cancel.cancel();
}
