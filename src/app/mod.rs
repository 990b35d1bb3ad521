//! Application core.
//!
//! The control components talk to the outside world only through the
//! **port traits** in [`ports`]; [`orchestrator`] wires them to the
//! scheduler, and [`state`] holds what the tasks coordinate on.

pub mod orchestrator;
pub mod ports;
pub mod state;
