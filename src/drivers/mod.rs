//! Peripheral drivers over `embedded-hal` traits, plus startup acquisition.

pub mod hw_init;
pub mod lm75a;
pub mod relay;
