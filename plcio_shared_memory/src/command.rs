//! Command protocol: opcodes, the fixed-size command record, NOK codes.
//!
//! ## Payload Contract
//!
//! | Opcode                         | Length | Payload                        |
//! |--------------------------------|--------|--------------------------------|
//! | `EXIT`, `PING`                 | 0      | -                              |
//! | `SET_BIT`, `RESET_BIT`, `INVERT_BIT` | 3 | `[area, byte, bit]`           |
//! | `SET_BITS`                     | 3k     | k × `[area, byte, bit]`, k ≥ 1 |
//! | `WRITE_BYTE` … `WRITE_REAL`    | 3      | `[area, byte, value…]`         |
//!
//! For `WRITE_*` the declared length stays 3; the value occupies
//! `width(T)` bytes starting at `values[2]`, little-endian.
//!
//! A `NOK` reply carries `[nok code, process sub-code, batch index]`.

use crate::error::{ShmError, ShmResult};
use plcio_common::consts::{COMMAND_CAPACITY, MAX_BATCH_BITS};
use plcio_common::process::{ProcessAddress, ProcessValue};
use static_assertions::const_assert_eq;
use std::fmt;

/// Length of one `[area, byte, bit]` address triple.
pub const ADDRESS_LEN: usize = 3;

/// Length of a NOK reply payload.
pub const NOK_LEN: usize = 3;

/// Stable command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Empty record
    None = 0,
    /// Stop the dispatch loop
    Exit = 1,
    /// Liveness probe
    Ping = 2,
    /// Reply to `Ping`
    Pong = 3,
    /// Command applied
    Ok = 4,
    /// Command rejected
    Nok = 5,
    /// Set one bit
    SetBit = 10,
    /// Reset one bit
    ResetBit = 11,
    /// Toggle one bit
    InvertBit = 12,
    /// Set a list of bits
    SetBits = 13,
    /// Write a byte
    WriteByte = 20,
    /// Write a 16-bit word
    WriteWord = 21,
    /// Write a 32-bit double word
    WriteDword = 22,
    /// Write a signed 32-bit integer
    WriteInt = 23,
    /// Write a 32-bit real
    WriteReal = 24,
}

impl Opcode {
    /// Decode a raw opcode.
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Exit,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::Ok,
            5 => Self::Nok,
            10 => Self::SetBit,
            11 => Self::ResetBit,
            12 => Self::InvertBit,
            13 => Self::SetBits,
            20 => Self::WriteByte,
            21 => Self::WriteWord,
            22 => Self::WriteDword,
            23 => Self::WriteInt,
            24 => Self::WriteReal,
            _ => return None,
        })
    }

    /// Raw opcode.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// NOK reason carried in `values[0]` of a NOK reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NokCode {
    /// Opcode unknown or not a request
    InvalidCommand = 1,
    /// Length does not match the opcode's contract
    DataLengthInvalid = 2,
    /// Length does not fit the record capacity
    DataLengthOutOfRange = 3,
    /// Area code is not INPUT, OUTPUT or MEMORY
    InvalidDriverArea = 4,
    /// Process memory rejected the address
    ProcessData = 5,
}

impl NokCode {
    /// Decode a raw NOK code.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::InvalidCommand,
            2 => Self::DataLengthInvalid,
            3 => Self::DataLengthOutOfRange,
            4 => Self::InvalidDriverArea,
            5 => Self::ProcessData,
            _ => return None,
        })
    }
}

impl fmt::Display for NokCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InvalidCommand => "invalid command",
            Self::DataLengthInvalid => "data length invalid",
            Self::DataLengthOutOfRange => "data length out of range",
            Self::InvalidDriverArea => "invalid driver area",
            Self::ProcessData => "process data error",
        };
        f.write_str(text)
    }
}

/// One request or reply record as stored in the segment.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CommandRecord {
    /// Raw opcode
    pub opcode: u32,
    /// Declared payload length
    pub length: u32,
    /// Payload bytes
    pub values: [u8; COMMAND_CAPACITY],
}

const_assert_eq!(core::mem::size_of::<CommandRecord>(), 8 + COMMAND_CAPACITY);
const_assert_eq!(core::mem::align_of::<CommandRecord>(), 4);

impl CommandRecord {
    /// Empty `NONE` record.
    pub const fn empty() -> Self {
        Self {
            opcode: Opcode::None as u32,
            length: 0,
            values: [0; COMMAND_CAPACITY],
        }
    }

    /// Record with `opcode` and `payload`.
    pub fn new(opcode: Opcode, payload: &[u8]) -> ShmResult<Self> {
        if payload.len() >= COMMAND_CAPACITY {
            return Err(ShmError::DataTooLarge {
                length: payload.len(),
                capacity: COMMAND_CAPACITY,
            });
        }
        let mut record = Self::empty();
        record.opcode = opcode.code();
        record.length = payload.len() as u32;
        record.values[..payload.len()].copy_from_slice(payload);
        Ok(record)
    }

    fn bare(opcode: Opcode) -> Self {
        Self {
            opcode: opcode.code(),
            ..Self::empty()
        }
    }

    /// Decoded opcode.
    pub fn decoded_opcode(&self) -> Option<Opcode> {
        Opcode::from_code(self.opcode)
    }

    /// Declared length as usize.
    pub fn len(&self) -> usize {
        self.length as usize
    }

    /// True if the declared length is zero.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Reject records whose length does not fit the capacity.
    pub fn check_capacity(&self) -> ShmResult<()> {
        if self.len() >= COMMAND_CAPACITY {
            return Err(ShmError::DataTooLarge {
                length: self.len(),
                capacity: COMMAND_CAPACITY,
            });
        }
        Ok(())
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// `EXIT` request.
    pub fn exit() -> Self {
        Self::bare(Opcode::Exit)
    }

    /// `PING` request.
    pub fn ping() -> Self {
        Self::bare(Opcode::Ping)
    }

    /// `SET_BIT` request.
    pub fn set_bit(addr: ProcessAddress) -> ShmResult<Self> {
        Self::new(Opcode::SetBit, &encode_address(addr)?)
    }

    /// `RESET_BIT` request.
    pub fn reset_bit(addr: ProcessAddress) -> ShmResult<Self> {
        Self::new(Opcode::ResetBit, &encode_address(addr)?)
    }

    /// `INVERT_BIT` request.
    pub fn invert_bit(addr: ProcessAddress) -> ShmResult<Self> {
        Self::new(Opcode::InvertBit, &encode_address(addr)?)
    }

    /// `SET_BITS` request.
    pub fn set_bits(addrs: &[ProcessAddress]) -> ShmResult<Self> {
        if addrs.len() > MAX_BATCH_BITS {
            return Err(ShmError::DataTooLarge {
                length: addrs.len() * ADDRESS_LEN,
                capacity: COMMAND_CAPACITY,
            });
        }
        let mut record = Self::bare(Opcode::SetBits);
        for (i, addr) in addrs.iter().enumerate() {
            let at = i * ADDRESS_LEN;
            record.values[at..at + ADDRESS_LEN].copy_from_slice(&encode_address(*addr)?);
        }
        record.length = (addrs.len() * ADDRESS_LEN) as u32;
        Ok(record)
    }

    /// `WRITE_*` request for any process value type.
    pub fn write<T: ProcessValue>(addr: ProcessAddress, value: T) -> ShmResult<Self> {
        let opcode = write_opcode::<T>();
        let [area, byte, _] = encode_address(addr)?;
        let mut record = Self::new(opcode, &[area, byte, 0])?;
        value.encode(&mut record.values[2..2 + T::WIDTH]);
        Ok(record)
    }

    /// `WRITE_BYTE` request.
    pub fn write_byte(addr: ProcessAddress, value: u8) -> ShmResult<Self> {
        Self::write(addr, value)
    }

    /// `WRITE_WORD` request.
    pub fn write_word(addr: ProcessAddress, value: u16) -> ShmResult<Self> {
        Self::write(addr, value)
    }

    /// `WRITE_DWORD` request.
    pub fn write_dword(addr: ProcessAddress, value: u32) -> ShmResult<Self> {
        Self::write(addr, value)
    }

    /// `WRITE_INT` request.
    pub fn write_int(addr: ProcessAddress, value: i32) -> ShmResult<Self> {
        Self::write(addr, value)
    }

    /// `WRITE_REAL` request.
    pub fn write_real(addr: ProcessAddress, value: f32) -> ShmResult<Self> {
        Self::write(addr, value)
    }

    // ─── Replies ────────────────────────────────────────────────────

    /// `OK` reply.
    pub fn ok() -> Self {
        Self::bare(Opcode::Ok)
    }

    /// `PONG` reply.
    pub fn pong() -> Self {
        Self::bare(Opcode::Pong)
    }

    /// `NOK` reply.
    pub fn nok(code: NokCode, process_code: u8, index: u8) -> Self {
        let mut record = Self::bare(Opcode::Nok);
        record.values[..NOK_LEN].copy_from_slice(&[code as u8, process_code, index]);
        record.length = NOK_LEN as u32;
        record
    }
}

impl Default for CommandRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.len().min(COMMAND_CAPACITY).min(16);
        f.debug_struct("CommandRecord")
            .field("opcode", &self.decoded_opcode().ok_or(self.opcode))
            .field("length", &self.length)
            .field("values", &&self.values[..shown])
            .finish()
    }
}

const fn write_opcode<T: ProcessValue>() -> Opcode {
    use plcio_common::process::ValueType;
    match T::TYPE {
        ValueType::Byte => Opcode::WriteByte,
        ValueType::Word => Opcode::WriteWord,
        ValueType::DWord => Opcode::WriteDword,
        ValueType::Int => Opcode::WriteInt,
        ValueType::Real => Opcode::WriteReal,
        ValueType::Bit => unreachable!(),
    }
}

/// Encode an address as `[area, byte, bit]`.
pub fn encode_address(addr: ProcessAddress) -> ShmResult<[u8; ADDRESS_LEN]> {
    let byte = u8::try_from(addr.byte_offset()).map_err(|_| ShmError::Unencodable {
        address: addr.to_string(),
    })?;
    Ok([addr.area_code(), byte, addr.bit_offset()])
}

/// Decode an `[area, byte, bit]` triple. The area is not validated here.
pub fn decode_address(triple: &[u8]) -> ProcessAddress {
    ProcessAddress::from_raw(triple[0], usize::from(triple[1]), triple[2])
}

/// A reply decoded for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Command applied
    Ok,
    /// Ping answered
    Pong,
    /// Exit acknowledged
    Exit,
    /// Command rejected
    Nok {
        /// Reason
        code: Option<NokCode>,
        /// Process memory sub-code, 0 if none
        process_code: u8,
        /// Failing batch entry, 0 if not a batch
        index: u8,
    },
    /// Opcode that is not a reply
    Unexpected {
        /// Raw opcode
        opcode: u32,
    },
}

impl Reply {
    /// Decode a reply record.
    pub fn from_record(record: &CommandRecord) -> Self {
        match record.decoded_opcode() {
            Some(Opcode::Ok) => Reply::Ok,
            Some(Opcode::Pong) => Reply::Pong,
            Some(Opcode::Exit) => Reply::Exit,
            Some(Opcode::Nok) => Reply::Nok {
                code: NokCode::from_code(record.values[0]),
                process_code: record.values[1],
                index: record.values[2],
            },
            _ => Reply::Unexpected {
                opcode: record.opcode,
            },
        }
    }

    /// True for `Ok`, `Pong` and `Exit`.
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Ok | Reply::Pong | Reply::Exit)
    }
}
