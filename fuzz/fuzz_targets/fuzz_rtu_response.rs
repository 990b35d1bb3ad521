//! Fuzz target: Modbus RTU response handling
//!
//! Treats the input as a device reply to a 16-register read and runs it
//! through framing, CRC check and register decoding.  Nothing may panic,
//! and anything accepted must decode to exactly the requested width.
//!
//! cargo fuzz run fuzz_rtu_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use pvrig::adapters::modbus_rtu::{decode_registers, parse_response, response_len};

fuzz_target!(|data: &[u8]| {
    if data.len() >= 3 {
        let want = response_len([data[0], data[1], data[2]]);
        assert!(want >= 5, "frame length below minimum");
    }

    if let Ok(payload) = parse_response(0x01, 0x04, data) {
        assert!(payload.len() + 4 == data.len());
        if let Ok(regs) = decode_registers(payload, 16) {
            assert_eq!(regs.len(), 16);
        }
    }
});
