//! Modbus RTU master over a serial link ([`RegisterPort`]).
//!
//! Frame layout:
//! ```text
//! ┌──────┬──────────┬──────────────┬────────────┐
//! │ unit │ function │ data (N B)   │ CRC16 (LE) │
//! └──────┴──────────┴──────────────┴────────────┘
//! ```
//!
//! Only the three functions the charge controller needs are implemented:
//! 0x01 read coils, 0x04 read input registers, 0x05 write single coil.
//! An exception response echoes the function with bit 7 set and carries
//! one exception-code byte.

use log::trace;

use crate::app::ports::RegisterPort;
use crate::error::{Result, TransportError};

pub const FN_READ_COILS: u8 = 0x01;
pub const FN_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FN_WRITE_SINGLE_COIL: u8 = 0x05;

const EXCEPTION_BIT: u8 = 0x80;
const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// Largest register read a single request may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_READ_COILS: u16 = 2000;

// ── CRC ───────────────────────────────────────────────────────

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &b in data {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}

fn seal(mut pdu: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&pdu);
    pdu.extend_from_slice(&crc.to_le_bytes());
    pdu
}

// ── Requests ──────────────────────────────────────────────────

fn request(unit: u8, function: u8, a: u16, b: u16) -> Vec<u8> {
    let [a_hi, a_lo] = a.to_be_bytes();
    let [b_hi, b_lo] = b.to_be_bytes();
    seal(vec![unit, function, a_hi, a_lo, b_hi, b_lo])
}

pub fn read_input_registers_request(unit: u8, start: u16, count: u16) -> Vec<u8> {
    request(unit, FN_READ_INPUT_REGISTERS, start, count)
}

pub fn read_coils_request(unit: u8, start: u16, count: u16) -> Vec<u8> {
    request(unit, FN_READ_COILS, start, count)
}

pub fn write_coil_request(unit: u8, address: u16, on: bool) -> Vec<u8> {
    request(
        unit,
        FN_WRITE_SINGLE_COIL,
        address,
        if on { COIL_ON } else { COIL_OFF },
    )
}

// ── Responses ─────────────────────────────────────────────────

/// Total frame length implied by the first three bytes of a response.
pub fn response_len(head: [u8; 3]) -> usize {
    let function = head[1];
    if function & EXCEPTION_BIT != 0 {
        return 5;
    }
    match function {
        FN_READ_COILS | FN_READ_INPUT_REGISTERS => 3 + usize::from(head[2]) + 2,
        // Echo of the request.
        _ => 8,
    }
}

/// Validate a complete response frame and return its data bytes
/// (everything between the function code and the CRC).
pub fn parse_response(
    unit: u8,
    function: u8,
    frame: &[u8],
) -> core::result::Result<&[u8], TransportError> {
    if frame.len() < 5 {
        return Err(TransportError::Malformed("short frame"));
    }
    let (body, crc) = frame.split_at(frame.len() - 2);
    if crc16(body) != u16::from_le_bytes([crc[0], crc[1]]) {
        return Err(TransportError::Crc);
    }
    if body[0] != unit {
        return Err(TransportError::Malformed("unit mismatch"));
    }
    if body[1] == function | EXCEPTION_BIT {
        return Err(TransportError::Exception {
            function,
            code: body[2],
        });
    }
    if body[1] != function {
        return Err(TransportError::Malformed("function mismatch"));
    }
    Ok(&body[2..])
}

fn counted(data: &[u8]) -> core::result::Result<&[u8], TransportError> {
    let (&n, rest) = data
        .split_first()
        .ok_or(TransportError::Malformed("missing byte count"))?;
    if rest.len() != usize::from(n) {
        return Err(TransportError::Malformed("byte count mismatch"));
    }
    Ok(rest)
}

pub fn decode_registers(data: &[u8], count: u16) -> core::result::Result<Vec<u16>, TransportError> {
    let bytes = counted(data)?;
    if bytes.len() != usize::from(count) * 2 {
        return Err(TransportError::Malformed("register count mismatch"));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect())
}

/// Coil bits are packed LSB-first, eight per byte.
pub fn decode_coils(data: &[u8], count: u16) -> core::result::Result<Vec<bool>, TransportError> {
    let bytes = counted(data)?;
    if bytes.len() != usize::from(count).div_ceil(8) {
        return Err(TransportError::Malformed("coil count mismatch"));
    }
    Ok((0..usize::from(count))
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

// ── Link ──────────────────────────────────────────────────────

/// Byte pipe to the RS485 adapter.  The read deadline belongs to the link.
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> core::result::Result<(), TransportError>;

    /// Fill `buf` completely or fail with [`TransportError::Timeout`].
    fn read_exact(&mut self, buf: &mut [u8]) -> core::result::Result<(), TransportError>;

    /// Drop stale bytes left over from an earlier, abandoned exchange.
    fn discard_input(&mut self) -> core::result::Result<(), TransportError> {
        Ok(())
    }
}

pub struct RtuClient<L> {
    link: L,
}

impl<L: SerialLink> RtuClient<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// One request/response exchange; returns the validated data bytes.
    fn exchange(&mut self, req: &[u8]) -> core::result::Result<Vec<u8>, TransportError> {
        let (unit, function) = (req[0], req[1]);
        self.link.discard_input()?;
        trace!("rtu > {}", hex::encode(req));
        self.link.write_all(req)?;

        let mut head = [0u8; 3];
        self.link.read_exact(&mut head)?;
        let mut frame = vec![0u8; response_len(head)];
        frame[..3].copy_from_slice(&head);
        self.link.read_exact(&mut frame[3..])?;
        trace!("rtu < {}", hex::encode(&frame));

        parse_response(unit, function, &frame).map(<[u8]>::to_vec)
    }
}

impl<L: SerialLink> RegisterPort for RtuClient<L> {
    fn read_input_registers(&mut self, unit: u8, start: u16, count: u16) -> Result<Vec<u16>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(TransportError::Malformed("register count out of range").into());
        }
        let data = self.exchange(&read_input_registers_request(unit, start, count))?;
        Ok(decode_registers(&data, count)?)
    }

    fn read_coils(&mut self, unit: u8, start: u16, count: u16) -> Result<Vec<bool>> {
        if count == 0 || count > MAX_READ_COILS {
            return Err(TransportError::Malformed("coil count out of range").into());
        }
        let data = self.exchange(&read_coils_request(unit, start, count))?;
        Ok(decode_coils(&data, count)?)
    }

    fn write_coil(&mut self, unit: u8, address: u16, on: bool) -> Result<()> {
        let req = write_coil_request(unit, address, on);
        let data = self.exchange(&req)?;
        if data.as_slice() != &req[2..6] {
            return Err(TransportError::Malformed("write echo mismatch").into());
        }
        Ok(())
    }
}
