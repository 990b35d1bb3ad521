//! Control logic: threshold checks, rig power sequencing, fan and heater,
//! and power-profile balancing.

pub mod balancer;
pub mod sequencer;
pub mod thermal;
pub mod threshold;
