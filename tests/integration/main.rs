//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem against mock adapters.  All
//! tests run on the host with no real hardware and no network beyond a
//! loopback stub.

mod http_stub;
mod mock_hw;
mod sequencer_tests;
mod services_tests;
