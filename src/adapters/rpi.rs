//! Raspberry Pi peripherals via `rppal`.
//!
//! ```text
//!   BCM GPIO ──▶ Relay / InputLine ──▶ Actuator / LevelSense
//!   /dev/i2c-1 ──▶ Lm75a            ──▶ Thermometer
//!   UART (RS485) ──▶ UartLink ──▶ RtuClient ──▶ RegisterPort
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;
use rppal::uart::{Parity, Queue, Uart};

use super::modbus_rtu::{RtuClient, SerialLink};
use crate::app::orchestrator::OutputLines;
use crate::app::ports::LevelSense;
use crate::config::{GpioConfig, Lm75aConfig, PvControllerConfig};
use crate::drivers::lm75a::Lm75a;
use crate::drivers::relay::{InputLine, Relay};
use crate::error::TransportError;

/// Claim every GPIO line; outputs start low (de-energized).
pub fn open_lines(cfg: &GpioConfig) -> rppal::gpio::Result<OutputLines> {
    let gpio = Gpio::new()?;
    let out = |pin: u8, name: &'static str| -> rppal::gpio::Result<Arc<Relay<OutputPin>>> {
        Ok(Arc::new(Relay::new(name, gpio.get(pin)?.into_output_low())))
    };
    let sense: Arc<dyn LevelSense> = Arc::new(InputLine::new(
        "rig_power_sense",
        gpio.get(cfg.rig_power_sense)?.into_input_pulldown(),
    ));
    let lines = OutputLines {
        precharge_resistor: out(cfg.precharge_resistor, "precharge_resistor")?,
        rig_switch: out(cfg.rig_power_switch, "rig_power_switch")?,
        fan: out(cfg.fan, "fan")?,
        heater: out(cfg.heater, "heater")?,
        rig_sense: Some(sense),
    };
    info!(
        "rpi: GPIO ready (precharge={} switch={} fan={} heater={} sense={})",
        cfg.precharge_resistor, cfg.rig_power_switch, cfg.fan, cfg.heater, cfg.rig_power_sense
    );
    Ok(lines)
}

pub fn open_thermometer(cfg: &Lm75aConfig) -> rppal::i2c::Result<Lm75a<I2c>> {
    let bus = I2c::new()?;
    info!("rpi: I2C bus {} ready, LM75A at {:#04x}", bus.bus(), cfg.address);
    Ok(Lm75a::new(bus, cfg.address))
}

pub fn open_controller(cfg: &PvControllerConfig) -> rppal::uart::Result<RtuClient<UartLink>> {
    let mut uart = Uart::with_path(&cfg.serial_port, cfg.baud_rate, Parity::None, 8, 1)?;
    let timeout = Duration::from_millis(cfg.timeout_ms);
    uart.set_read_mode(0, timeout)?;
    info!("rpi: {} open at {} baud", cfg.serial_port, cfg.baud_rate);
    Ok(RtuClient::new(UartLink { uart, timeout }))
}

/// RS485 adapter on a UART; the read deadline covers one whole `read_exact`.
pub struct UartLink {
    uart: Uart,
    timeout: Duration,
}

fn io(e: rppal::uart::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

impl SerialLink for UartLink {
    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), TransportError> {
        while !bytes.is_empty() {
            let n = self.uart.write(bytes).map_err(io)?;
            bytes = &bytes[n..];
        }
        self.uart.drain().map_err(io)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.timeout;
        let mut filled = 0;
        while filled < buf.len() {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            match self.uart.read(&mut buf[filled..]).map_err(io)? {
                0 => return Err(TransportError::Timeout),
                n => filled += n,
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.uart.flush(Queue::Input).map_err(io)
    }
}
