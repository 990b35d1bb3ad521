//! Relay outputs and sense inputs over `embedded-hal` digital traits.
//!
//! Any `StatefulOutputPin` becomes an [`Actuator`]; any `InputPin` becomes a
//! [`LevelSense`].  The pin sits behind a mutex because the HAL traits take
//! `&mut self` while the control tasks share lines through `Arc`s.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::app::ports::{Actuator, LevelSense};
use crate::error::{ActuatorError, Result};

pub struct Relay<P> {
    name: &'static str,
    pin: Mutex<P>,
}

impl<P> Relay<P> {
    pub fn new(name: &'static str, pin: P) -> Self {
        Self {
            name,
            pin: Mutex::new(pin),
        }
    }

    fn pin(&self) -> MutexGuard<'_, P> {
        self.pin.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: StatefulOutputPin + Send> Actuator for Relay<P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn assert_high(&self) -> Result<()> {
        self.pin()
            .set_high()
            .map_err(|_| ActuatorError::WriteFailed(self.name).into())
    }

    fn assert_low(&self) -> Result<()> {
        self.pin()
            .set_low()
            .map_err(|_| ActuatorError::WriteFailed(self.name).into())
    }

    fn is_high(&self) -> Result<bool> {
        self.pin()
            .is_set_high()
            .map_err(|_| ActuatorError::ReadFailed(self.name).into())
    }
}

pub struct InputLine<P> {
    name: &'static str,
    pin: Mutex<P>,
}

impl<P> InputLine<P> {
    pub fn new(name: &'static str, pin: P) -> Self {
        Self {
            name,
            pin: Mutex::new(pin),
        }
    }
}

impl<P: InputPin + Send> LevelSense for InputLine<P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_high(&self) -> Result<bool> {
        self.pin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_high()
            .map_err(|_| ActuatorError::ReadFailed(self.name).into())
    }
}

/// Momentary press: high, hold, low.
pub async fn pulse(line: &dyn Actuator, hold: Duration) -> Result<()> {
    line.assert_high()?;
    tokio::time::sleep(hold).await;
    line.assert_low()
}
