//! Mock hardware and service adapters for integration tests.
//!
//! Every line, coil and API call lands in one shared [`EventLog`] so tests
//! can assert on the exact order of a power sequence without touching real
//! GPIO, serial ports or HTTP.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use pvrig::app::orchestrator::{Hardware, OutputLines, Services};
use pvrig::app::ports::{
    Actuator, BoxFuture, LevelSense, PowerProfileApi, RegisterPort, TelemetryRecord, TelemetrySink,
    Thermometer,
};
use pvrig::control::balancer::ProfileLevel;
use pvrig::error::{ActuatorError, ApiError, Result, SensorError};
use pvrig::telemetry::{ChargeStage, Reading};

// ── Event log ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    High(&'static str),
    Low(&'static str),
    Coil(bool),
    ApplyProfile(ProfileLevel),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Events touching the named line only.
    pub fn on(&self, line: &'static str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::High(n) | Event::Low(n) if *n == line))
            .collect()
    }
}

// ── Lines ─────────────────────────────────────────────────────

pub struct MockLine {
    name: &'static str,
    log: EventLog,
    level: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl MockLine {
    pub fn new(name: &'static str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            level: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Drive an input externally (rig switched by hand).
    pub fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    fn write(&self, high: bool) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ActuatorError::WriteFailed(self.name).into());
        }
        self.level.store(high, Ordering::SeqCst);
        self.log.push(if high { Event::High(self.name) } else { Event::Low(self.name) });
        Ok(())
    }
}

impl Actuator for MockLine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn assert_high(&self) -> Result<()> {
        self.write(true)
    }

    fn assert_low(&self) -> Result<()> {
        self.write(false)
    }

    fn is_high(&self) -> Result<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ActuatorError::ReadFailed(self.name).into());
        }
        Ok(self.level())
    }
}

impl LevelSense for MockLine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_high(&self) -> Result<bool> {
        Ok(self.level())
    }
}

// ── Charge controller ─────────────────────────────────────────

/// Register image served to the sampler; the load-switch coil is logged.
pub struct MockRegisters {
    log: EventLog,
    reading: Arc<Mutex<Reading>>,
    coil: bool,
    pub fail_coil_writes: Arc<AtomicBool>,
}

impl MockRegisters {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            reading: Arc::new(Mutex::new(reading(0.0, 0.0, 25.0, 50.0))),
            coil: false,
            fail_coil_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for changing what the next poll returns.
    pub fn reading_handle(&self) -> Arc<Mutex<Reading>> {
        Arc::clone(&self.reading)
    }
}

impl RegisterPort for MockRegisters {
    fn read_input_registers(&mut self, _unit: u8, start: u16, count: u16) -> Result<Vec<u16>> {
        let r = *self.reading.lock().unwrap();
        let mut regs = vec![0u16; usize::from(count)];
        match start {
            0x3100 => {
                let pv = (r.pv_power * 100.0) as u32;
                let load = (r.load_power * 100.0) as u32;
                regs[2] = pv as u16;
                regs[3] = (pv >> 16) as u16;
                regs[4] = (r.batt_voltage * 100.0) as u16;
                regs[14] = load as u16;
                regs[15] = (load >> 16) as u16;
            }
            0x311A => regs[0] = r.batt_soc as u16,
            0x3201 => {
                regs[0] = match r.stage {
                    ChargeStage::NoCharging => 0,
                    ChargeStage::Float => 1,
                    ChargeStage::Boost => 2,
                    ChargeStage::Equalization => 3,
                } << 2;
            }
            _ => {}
        }
        Ok(regs)
    }

    fn read_coils(&mut self, _unit: u8, _start: u16, _count: u16) -> Result<Vec<bool>> {
        Ok(vec![self.coil])
    }

    fn write_coil(&mut self, _unit: u8, _address: u16, on: bool) -> Result<()> {
        if self.fail_coil_writes.load(Ordering::SeqCst) {
            return Err(pvrig::error::TransportError::Timeout.into());
        }
        self.coil = on;
        self.log.push(Event::Coil(on));
        Ok(())
    }
}

pub fn reading(pv: f64, load: f64, volt: f64, soc: f64) -> Reading {
    Reading {
        pv_power: pv,
        load_power: load,
        batt_voltage: volt,
        batt_soc: soc,
        stage: ChargeStage::Boost,
        sampled_at: Utc::now(),
    }
}

// ── Thermometer ───────────────────────────────────────────────

pub struct MockThermometer {
    celsius: Mutex<Option<f64>>,
}

impl MockThermometer {
    pub fn new(celsius: f64) -> Arc<Self> {
        Arc::new(Self {
            celsius: Mutex::new(Some(celsius)),
        })
    }

    pub fn set(&self, celsius: Option<f64>) {
        *self.celsius.lock().unwrap() = celsius;
    }
}

impl Thermometer for MockThermometer {
    fn read_celsius(&self) -> Result<f64> {
        self.celsius
            .lock()
            .unwrap()
            .ok_or_else(|| SensorError::ReadFailed.into())
    }
}

// ── Power-profile API ─────────────────────────────────────────

pub struct MockProfileApi {
    log: EventLog,
    level: Mutex<ProfileLevel>,
    pub current_calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockProfileApi {
    pub fn new(level: ProfileLevel, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            level: Mutex::new(level),
            current_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn level(&self) -> ProfileLevel {
        *self.level.lock().unwrap()
    }

    pub fn applied(&self) -> Vec<ProfileLevel> {
        self.log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::ApplyProfile(l) => Some(l),
                _ => None,
            })
            .collect()
    }
}

impl PowerProfileApi for MockProfileApi {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn current_profile(&self) -> BoxFuture<'_, Result<ProfileLevel>> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let level = self.level();
        Box::pin(async move { Ok(level) })
    }

    fn apply_profile(&self, level: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Status { service: "mock", code: 503 }.into());
            }
            self.log.push(Event::ApplyProfile(level));
            *self.level.lock().unwrap() = level;
            Ok(level)
        })
    }
}

// ── Telemetry sink ────────────────────────────────────────────

#[derive(Default)]
pub struct MockSink {
    pub records: Mutex<Vec<TelemetryRecord>>,
}

impl TelemetrySink for MockSink {
    fn send(&self, record: TelemetryRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.records.lock().unwrap().push(record);
            Ok(())
        })
    }
}

// ── Rig bundle ────────────────────────────────────────────────

/// Every mock wired the way the orchestrator expects.
pub struct MockRig {
    pub log: EventLog,
    pub precharge: Arc<MockLine>,
    pub switch: Arc<MockLine>,
    pub fan: Arc<MockLine>,
    pub heater: Arc<MockLine>,
    pub sense: Arc<MockLine>,
    pub thermometer: Arc<MockThermometer>,
    pub api: Arc<MockProfileApi>,
    pub sink: Arc<MockSink>,
    pub reading: Arc<Mutex<Reading>>,
    registers: Option<MockRegisters>,
}

impl MockRig {
    pub fn new() -> Self {
        let log = EventLog::default();
        let registers = MockRegisters::new(&log);
        Self {
            precharge: MockLine::new("precharge_resistor", &log),
            switch: MockLine::new("rig_power_switch", &log),
            fan: MockLine::new("fan", &log),
            heater: MockLine::new("heater", &log),
            sense: MockLine::new("rig_power_sense", &log),
            thermometer: MockThermometer::new(20.0),
            api: MockProfileApi::new(ProfileLevel::Medium, &log),
            sink: Arc::new(MockSink::default()),
            reading: registers.reading_handle(),
            registers: Some(registers),
            log,
        }
    }

    pub fn lines(&self, with_sense: bool) -> OutputLines {
        OutputLines {
            precharge_resistor: self.precharge.clone(),
            rig_switch: self.switch.clone(),
            fan: self.fan.clone(),
            heater: self.heater.clone(),
            rig_sense: with_sense.then(|| self.sense.clone() as Arc<dyn LevelSense>),
        }
    }

    /// Hand the register port over; callable once.
    pub fn take_registers(&mut self) -> MockRegisters {
        self.registers.take().unwrap()
    }

    pub fn hardware(&mut self, with_sense: bool) -> Hardware {
        Hardware {
            lines: self.lines(with_sense),
            registers: Box::new(self.take_registers()),
            thermometer: self.thermometer.clone(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            telemetry: self.sink.clone(),
            profile: Some(self.api.clone() as Arc<dyn PowerProfileApi>),
        }
    }
}
