//! PvRig controller library.
//!
//! Everything except the Raspberry Pi peripheral glue (`adapters::rpi`,
//! feature `rpi`) builds and tests on any host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod scheduler;
pub mod telemetry;
