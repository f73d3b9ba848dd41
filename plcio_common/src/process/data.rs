//! The process image: three fixed-size byte areas with typed access.

use super::address::{ProcessAddress, ProcessArea};
use super::error::{BatchError, ProcessResult};
use super::value::ProcessValue;
use crate::consts::{PROCESS_AREA_COUNT, PROCESS_AREA_SIZE};
use static_assertions::const_assert_eq;
use std::fmt;

/// INPUT, OUTPUT and MEMORY byte areas.
///
/// `#[repr(C)]` plain bytes: the same struct lives inside the shared memory
/// segment and inside every driver snapshot, so its layout is part of the
/// segment wire format.
#[derive(Clone, PartialEq, Eq)]
#[repr(C)]
pub struct ProcessData {
    input: [u8; PROCESS_AREA_SIZE],
    output: [u8; PROCESS_AREA_SIZE],
    memory: [u8; PROCESS_AREA_SIZE],
}

const_assert_eq!(
    core::mem::size_of::<ProcessData>(),
    PROCESS_AREA_SIZE * PROCESS_AREA_COUNT
);
const_assert_eq!(core::mem::align_of::<ProcessData>(), 1);

impl ProcessData {
    /// Create a zeroed process image.
    pub const fn new() -> Self {
        Self {
            input: [0; PROCESS_AREA_SIZE],
            output: [0; PROCESS_AREA_SIZE],
            memory: [0; PROCESS_AREA_SIZE],
        }
    }

    /// Read-only view of one area.
    #[inline]
    pub fn area(&self, area: ProcessArea) -> &[u8; PROCESS_AREA_SIZE] {
        match area {
            ProcessArea::Input => &self.input,
            ProcessArea::Output => &self.output,
            ProcessArea::Memory => &self.memory,
        }
    }

    /// Mutable view of one area.
    #[inline]
    pub fn area_mut(&mut self, area: ProcessArea) -> &mut [u8; PROCESS_AREA_SIZE] {
        match area {
            ProcessArea::Input => &mut self.input,
            ProcessArea::Output => &mut self.output,
            ProcessArea::Memory => &mut self.memory,
        }
    }

    /// Copy one whole area from `other`.
    pub fn copy_area_from(&mut self, other: &ProcessData, area: ProcessArea) {
        self.area_mut(area).copy_from_slice(other.area(area));
    }

    /// Validate `addr` for `width` bytes and return the addressed span.
    fn span(&self, addr: ProcessAddress, width: usize) -> ProcessResult<&[u8]> {
        let area = addr.validate(width)?;
        let start = addr.byte_offset();
        Ok(&self.area(area)[start..start + width])
    }

    fn span_mut(&mut self, addr: ProcessAddress, width: usize) -> ProcessResult<&mut [u8]> {
        let area = addr.validate(width)?;
        let start = addr.byte_offset();
        Ok(&mut self.area_mut(area)[start..start + width])
    }

    // ─── Typed access ───────────────────────────────────────────────

    /// Read a typed value at `addr`. The bit offset is validated but unused.
    pub fn get<T: ProcessValue>(&self, addr: ProcessAddress) -> ProcessResult<T> {
        self.span(addr, T::WIDTH).map(T::decode)
    }

    /// Write a typed value at `addr`, touching exactly `T::WIDTH` bytes.
    pub fn set<T: ProcessValue>(&mut self, addr: ProcessAddress, value: T) -> ProcessResult<()> {
        value.encode(self.span_mut(addr, T::WIDTH)?);
        Ok(())
    }

    /// Read a byte.
    pub fn get_byte(&self, addr: ProcessAddress) -> ProcessResult<u8> {
        self.get(addr)
    }

    /// Write a byte.
    pub fn set_byte(&mut self, addr: ProcessAddress, value: u8) -> ProcessResult<()> {
        self.set(addr, value)
    }

    /// Read a 16-bit word.
    pub fn get_word(&self, addr: ProcessAddress) -> ProcessResult<u16> {
        self.get(addr)
    }

    /// Write a 16-bit word.
    pub fn set_word(&mut self, addr: ProcessAddress, value: u16) -> ProcessResult<()> {
        self.set(addr, value)
    }

    /// Read a 32-bit double word.
    pub fn get_dword(&self, addr: ProcessAddress) -> ProcessResult<u32> {
        self.get(addr)
    }

    /// Write a 32-bit double word.
    pub fn set_dword(&mut self, addr: ProcessAddress, value: u32) -> ProcessResult<()> {
        self.set(addr, value)
    }

    /// Read a signed 32-bit integer.
    pub fn get_int(&self, addr: ProcessAddress) -> ProcessResult<i32> {
        self.get(addr)
    }

    /// Write a signed 32-bit integer.
    pub fn set_int(&mut self, addr: ProcessAddress, value: i32) -> ProcessResult<()> {
        self.set(addr, value)
    }

    /// Read a 32-bit real.
    pub fn get_real(&self, addr: ProcessAddress) -> ProcessResult<f32> {
        self.get(addr)
    }

    /// Write a 32-bit real.
    pub fn set_real(&mut self, addr: ProcessAddress, value: f32) -> ProcessResult<()> {
        self.set(addr, value)
    }

    // ─── Bit access ─────────────────────────────────────────────────

    /// Read one bit.
    pub fn get_bit(&self, addr: ProcessAddress) -> ProcessResult<bool> {
        let byte = self.span(addr, 1)?[0];
        Ok((byte >> addr.bit_offset()) & 1 == 1)
    }

    /// Write one bit to `value`, leaving the other seven untouched.
    pub fn write_bit(&mut self, addr: ProcessAddress, value: bool) -> ProcessResult<()> {
        if value {
            self.set_bit(addr)
        } else {
            self.reset_bit(addr)
        }
    }

    /// Set one bit to 1.
    pub fn set_bit(&mut self, addr: ProcessAddress) -> ProcessResult<()> {
        let mask = 1u8 << (addr.bit_offset() & 7);
        self.span_mut(addr, 1)?[0] |= mask;
        Ok(())
    }

    /// Reset one bit to 0.
    pub fn reset_bit(&mut self, addr: ProcessAddress) -> ProcessResult<()> {
        let mask = 1u8 << (addr.bit_offset() & 7);
        self.span_mut(addr, 1)?[0] &= !mask;
        Ok(())
    }

    /// Toggle one bit.
    pub fn invert_bit(&mut self, addr: ProcessAddress) -> ProcessResult<()> {
        let mask = 1u8 << (addr.bit_offset() & 7);
        self.span_mut(addr, 1)?[0] ^= mask;
        Ok(())
    }

    // ─── Batch access ───────────────────────────────────────────────

    /// Read bits left to right, stopping at the first invalid address.
    ///
    /// On failure the error carries the bits read before the bad entry.
    pub fn get_bits(&self, addrs: &[ProcessAddress]) -> Result<Vec<bool>, BatchError<Vec<bool>>> {
        let mut values = Vec::with_capacity(addrs.len());
        for (index, addr) in addrs.iter().enumerate() {
            match self.get_bit(*addr) {
                Ok(bit) => values.push(bit),
                Err(source) => {
                    return Err(BatchError {
                        index,
                        partial: values,
                        source,
                    });
                }
            }
        }
        Ok(values)
    }

    /// Set bits left to right, stopping at the first invalid address.
    ///
    /// Not atomic: entries before the failing one stay applied.
    pub fn set_bits(&mut self, addrs: &[ProcessAddress]) -> Result<(), BatchError> {
        for (index, addr) in addrs.iter().enumerate() {
            self.set_bit(*addr).map_err(|source| BatchError {
                index,
                partial: (),
                source,
            })?;
        }
        Ok(())
    }

    /// Zero the given areas.
    pub fn clear(&mut self, areas: &[ProcessArea]) {
        for area in areas {
            self.area_mut(*area).fill(0);
        }
    }

    /// Zero every area.
    pub fn clear_all(&mut self) {
        self.clear(&ProcessArea::ALL);
    }
}

impl Default for ProcessData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = |area: &[u8]| area.iter().filter(|b| **b != 0).count();
        f.debug_struct("ProcessData")
            .field("input_nonzero", &used(&self.input))
            .field("output_nonzero", &used(&self.output))
            .field("memory_nonzero", &used(&self.memory))
            .finish()
    }
}
