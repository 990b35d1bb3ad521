//! LM75A digital thermometer (battery temperature).
//!
//! Temperature register 0x00: two bytes, MSB first, 11-bit two's
//! complement left-aligned, 0.125 °C per LSB.

use std::sync::{Mutex, PoisonError};

use embedded_hal::i2c::I2c;
use log::trace;

use crate::app::ports::Thermometer;
use crate::error::{Result, SensorError};

const REG_TEMP: u8 = 0x00;

/// Datasheet operating range.
const MIN_C: f64 = -55.0;
const MAX_C: f64 = 125.0;

pub struct Lm75a<I> {
    bus: Mutex<I>,
    address: u8,
}

impl<I> Lm75a<I> {
    pub fn new(bus: I, address: u8) -> Self {
        Self {
            bus: Mutex::new(bus),
            address,
        }
    }
}

/// Raw register bytes to °C.
pub fn decode_temperature(msb: u8, lsb: u8) -> f64 {
    let raw = i16::from_be_bytes([msb, lsb]) >> 5;
    f64::from(raw) * 0.125
}

impl<I: I2c + Send> Thermometer for Lm75a<I> {
    fn read_celsius(&self) -> Result<f64> {
        let mut buf = [0u8; 2];
        self.bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_read(self.address, &[REG_TEMP], &mut buf)
            .map_err(|_| SensorError::ReadFailed)?;
        let t = decode_temperature(buf[0], buf[1]);
        trace!("lm75a@{:#04x}: {:02x}{:02x} -> {:.3} °C", self.address, buf[0], buf[1], t);
        if !(MIN_C..=MAX_C).contains(&t) {
            return Err(SensorError::OutOfRange.into());
        }
        Ok(t)
    }
}
