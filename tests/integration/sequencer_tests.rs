//! Power sequencing against recording mocks on a paused clock.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use pvrig::app::state::SharedState;
use pvrig::config::SystemConfig;
use pvrig::control::sequencer::{CycleOutcome, PowerLines, PowerSequencer};
use pvrig::control::thermal::FanController;
use pvrig::scheduler::Worker;
use pvrig::telemetry::sampler::TelemetrySampler;
use pvrig::telemetry::window::WindowAggregator;

use crate::mock_hw::{Event, MockRegisters, MockRig, reading};

struct Bench {
    rig: MockRig,
    seq: PowerSequencer,
    fan: FanController,
    state: SharedState,
}

fn bench_with(mut rig: MockRig, registers: Option<MockRegisters>, with_sense: bool) -> Bench {
    let cfg = SystemConfig::default();
    let state = SharedState::new();
    let registers = registers.unwrap_or_else(|| rig.take_registers());
    let fan = FanController::new(rig.fan.clone(), state.clone(), Worker::new(), &cfg.control.fan);
    let lines = rig.lines(with_sense);
    let seq = PowerSequencer::new(
        PowerLines {
            precharge_resistor: lines.precharge_resistor,
            rig_switch: lines.rig_switch,
            rig_sense: lines.rig_sense,
        },
        TelemetrySampler::new(Box::new(registers), 1),
        fan.clone(),
        state.clone(),
        &cfg.control.power,
    );
    Bench { rig, seq, fan, state }
}

fn bench() -> Bench {
    bench_with(MockRig::new(), None, false)
}

fn energize(state: &SharedState) {
    let mut s = state.lock();
    s.load_energized = true;
    s.load_started_at = Some(Instant::now());
}

// ── Energize ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn power_on_follows_inrush_safe_order() {
    let b = bench();
    let start = Instant::now();

    b.seq.power_on().await.unwrap();

    assert_eq!(
        b.rig.log.events(),
        vec![
            Event::High("precharge_resistor"),
            Event::Coil(true),
            Event::Low("precharge_resistor"),
            Event::High("rig_power_switch"),
            Event::Low("rig_power_switch"),
            Event::High("fan"),
        ]
    );
    // 300 + 1000 + 4000 + 300 + 100 ms
    assert!(start.elapsed() >= Duration::from_millis(5700));

    let snap = b.state.snapshot();
    assert!(snap.load_energized);
    assert!(snap.load_started_at.is_some());
    assert!(!snap.fan_stop_pending);
}

#[tokio::test(start_paused = true)]
async fn repeated_power_cycle_replays_every_step() {
    let b = bench();
    b.seq.power_on().await.unwrap();
    b.seq.power_off().await.unwrap();
    assert!(b.fan.stop_pending());
    b.rig.log.clear();

    b.seq.power_on().await.unwrap();
    assert_eq!(
        b.rig.log.events(),
        vec![
            Event::High("precharge_resistor"),
            Event::Coil(true),
            Event::Low("precharge_resistor"),
            Event::High("rig_power_switch"),
            Event::Low("rig_power_switch"),
            Event::High("fan"),
        ]
    );

    // The cooldown stop from the first cycle must not fire.
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert!(b.rig.fan.level());
    assert!(!b.fan.stop_pending());
    assert!(b.state.snapshot().load_energized);
}

#[tokio::test(start_paused = true)]
async fn soc_rule_energizes_once() {
    let b = bench();
    let full = reading(400.0, 0.0, 27.0, 95.0);

    assert_eq!(b.seq.run_cycle(&full).await.unwrap(), CycleOutcome::PoweredOn);
    let after_first = b.rig.log.events().len();

    // Already on and above the off rule: nothing more happens.
    assert_eq!(b.seq.run_cycle(&full).await.unwrap(), CycleOutcome::Unchanged);
    assert_eq!(b.rig.log.events().len(), after_first);
}

#[tokio::test(start_paused = true)]
async fn below_on_rule_stays_off() {
    let b = bench();
    let low = reading(400.0, 0.0, 26.0, 89.0);
    assert_eq!(b.seq.run_cycle(&low).await.unwrap(), CycleOutcome::Unchanged);
    assert!(b.rig.log.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_coil_write_releases_precharge_resistor() {
    let mut rig = MockRig::new();
    let registers = rig.take_registers();
    registers.fail_coil_writes.store(true, Ordering::SeqCst);
    let b = bench_with(rig, Some(registers), false);

    assert!(b.seq.power_on().await.is_err());
    assert_eq!(
        b.rig.log.events(),
        vec![Event::High("precharge_resistor"), Event::Low("precharge_resistor")]
    );
    assert!(!b.state.snapshot().load_energized);
}

// ── De-energize ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn low_voltage_powers_off_and_schedules_fan_stop() {
    let b = bench();
    energize(&b.state);
    b.fan.start().unwrap();
    b.rig.log.clear();
    let start = Instant::now();

    let sag = reading(0.0, 300.0, 22.8, 40.0);
    assert_eq!(b.seq.run_cycle(&sag).await.unwrap(), CycleOutcome::PoweredOff);

    assert_eq!(
        b.rig.log.events(),
        vec![
            Event::High("rig_power_switch"),
            Event::Low("rig_power_switch"),
            Event::Coil(false),
        ]
    );
    assert!(start.elapsed() >= Duration::from_millis(20_300));

    let snap = b.state.snapshot();
    assert!(!snap.load_energized);
    assert!(snap.load_started_at.is_none());
    assert!(snap.fan_stop_pending);
    assert!(b.rig.fan.level(), "fan keeps running through cooldown");

    tokio::time::sleep(Duration::from_secs(10 * 60 + 1)).await;
    assert!(!b.rig.fan.level());
    assert!(!b.fan.stop_pending());
}

#[tokio::test(start_paused = true)]
async fn shutdown_request_powers_off_running_rig() {
    let b = bench();
    energize(&b.state);
    b.state.request_shutdown();

    let healthy = reading(400.0, 300.0, 26.5, 95.0);
    assert_eq!(b.seq.run_cycle(&healthy).await.unwrap(), CycleOutcome::PoweredOff);
    assert!(!b.state.snapshot().shutdown_requested);
}

#[tokio::test(start_paused = true)]
async fn shutdown_request_while_off_is_dropped_without_pulse() {
    let b = bench();
    b.state.request_shutdown();

    let dim = reading(50.0, 0.0, 25.0, 50.0);
    assert_eq!(b.seq.run_cycle(&dim).await.unwrap(), CycleOutcome::Unchanged);
    assert!(b.rig.log.on("rig_power_switch").is_empty());
    assert!(!b.state.snapshot().shutdown_requested);
}

// ── Fan stop vs. power-on ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn power_on_cancels_pending_fan_stop() {
    let b = bench();
    energize(&b.state);
    b.fan.start().unwrap();
    b.seq.power_off().await.unwrap();
    assert!(b.fan.stop_pending());

    tokio::time::sleep(Duration::from_secs(60)).await;
    b.seq.power_on().await.unwrap();
    assert!(!b.fan.stop_pending());

    // Well past the first cooldown deadline.
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert!(b.rig.fan.level());
    assert_eq!(b.rig.log.on("fan").last(), Some(&Event::High("fan")));
}

// ── Sense input / windows ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn sense_input_overrides_cached_state() {
    let b = bench_with(MockRig::new(), None, true);
    b.rig.sense.set_level(true);

    let mid = reading(200.0, 250.0, 26.0, 60.0);
    assert_eq!(b.seq.run_cycle(&mid).await.unwrap(), CycleOutcome::Unchanged);
    let snap = b.state.snapshot();
    assert!(snap.load_energized);
    assert!(snap.load_started_at.is_some());

    b.rig.sense.set_level(false);
    b.seq.run_cycle(&mid).await.unwrap();
    assert!(!b.state.snapshot().load_energized);
}

#[tokio::test(start_paused = true)]
async fn tick_waits_for_enough_samples() {
    let b = bench();
    let windows = WindowAggregator::new(5);
    for _ in 0..4 {
        windows.push_sample(reading(400.0, 0.0, 27.0, 95.0));
    }
    assert_eq!(b.seq.tick(&windows).await.unwrap(), CycleOutcome::NoData);

    windows.push_sample(reading(400.0, 0.0, 27.0, 95.0));
    assert_eq!(b.seq.tick(&windows).await.unwrap(), CycleOutcome::PoweredOn);
    assert_eq!(windows.depths(), (0, 1, 0, 0));
}
