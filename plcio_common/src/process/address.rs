//! Process areas and addresses.

use super::error::ProcessError;
use crate::consts::PROCESS_AREA_SIZE;
use std::fmt;

/// Highest valid bit offset inside a byte.
pub const MAX_BIT_OFFSET: u8 = 7;

/// One of the three process memory areas.
///
/// The discriminant is the area code used on the command wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessArea {
    /// Inputs read from the field
    Input = 0,
    /// Outputs written to the field
    Output = 1,
    /// Internal registers
    Memory = 2,
}

impl ProcessArea {
    /// All areas in wire-code order.
    pub const ALL: [Self; 3] = [Self::Input, Self::Output, Self::Memory];

    /// Convert from a raw area code. Returns `None` for invalid codes.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            2 => Some(Self::Memory),
            _ => None,
        }
    }

    /// Raw area code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProcessArea {
    type Error = ProcessError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(ProcessError::AreaOutOfRange { area: code })
    }
}

impl fmt::Display for ProcessArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Output => write!(f, "OUTPUT"),
            Self::Memory => write!(f, "MEMORY"),
        }
    }
}

/// Location inside one `ProcessData`: area, byte offset, bit offset.
///
/// The area is kept as its raw code so that addresses decoded from the wire
/// or from external callers can carry an invalid area; it is rejected when
/// the address is validated, after the bit and byte checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessAddress {
    area: u8,
    byte: usize,
    bit: u8,
}

impl ProcessAddress {
    /// Address of bit `bit` of byte `byte` in `area`.
    #[inline]
    pub const fn new(area: ProcessArea, byte: usize, bit: u8) -> Self {
        Self {
            area: area as u8,
            byte,
            bit,
        }
    }

    /// Address of byte `byte` in `area` (bit offset 0).
    #[inline]
    pub const fn at_byte(area: ProcessArea, byte: usize) -> Self {
        Self::new(area, byte, 0)
    }

    /// Address built from a raw, unchecked area code.
    #[inline]
    pub const fn from_raw(area: u8, byte: usize, bit: u8) -> Self {
        Self { area, byte, bit }
    }

    /// Raw area code.
    #[inline]
    pub const fn area_code(&self) -> u8 {
        self.area
    }

    /// Byte offset inside the area.
    #[inline]
    pub const fn byte_offset(&self) -> usize {
        self.byte
    }

    /// Bit offset inside the byte.
    #[inline]
    pub const fn bit_offset(&self) -> u8 {
        self.bit
    }

    /// Decoded area.
    pub fn area(&self) -> Result<ProcessArea, ProcessError> {
        ProcessArea::try_from(self.area)
    }

    /// Validate this address for a value `width` bytes wide.
    ///
    /// Checks bit, then byte span, then area, and returns the decoded area.
    pub fn validate(&self, width: usize) -> Result<ProcessArea, ProcessError> {
        if self.bit > MAX_BIT_OFFSET {
            return Err(ProcessError::BitOutOfRange { bit: self.bit });
        }
        let fits = self
            .byte
            .checked_add(width)
            .is_some_and(|end| end <= PROCESS_AREA_SIZE);
        if !fits {
            return Err(ProcessError::ByteOutOfRange {
                byte: self.byte,
                width,
            });
        }
        self.area()
    }
}

impl fmt::Display for ProcessAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ProcessArea::from_code(self.area) {
            Some(area) => write!(f, "{area}[{}].{}", self.byte, self.bit),
            None => write!(f, "AREA#{}[{}].{}", self.area, self.byte, self.bit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_code_roundtrip() {
        for area in ProcessArea::ALL {
            assert_eq!(ProcessArea::from_code(area.code()), Some(area));
        }
        assert!(ProcessArea::from_code(3).is_none());
        assert_eq!(
            ProcessArea::try_from(5),
            Err(ProcessError::AreaOutOfRange { area: 5 })
        );
    }

    #[test]
    fn validation_priority_bit_then_byte_then_area() {
        let all_bad = ProcessAddress::from_raw(5, PROCESS_AREA_SIZE + 10, 70);
        assert_eq!(
            all_bad.validate(1),
            Err(ProcessError::BitOutOfRange { bit: 70 })
        );

        let byte_and_area = ProcessAddress::from_raw(5, PROCESS_AREA_SIZE + 10, 0);
        assert!(matches!(
            byte_and_area.validate(1),
            Err(ProcessError::ByteOutOfRange { .. })
        ));

        let area_only = ProcessAddress::from_raw(5, 0, 0);
        assert_eq!(
            area_only.validate(1),
            Err(ProcessError::AreaOutOfRange { area: 5 })
        );
    }

    #[test]
    fn width_counts_toward_span() {
        let last = ProcessAddress::at_byte(ProcessArea::Memory, PROCESS_AREA_SIZE - 1);
        assert_eq!(last.validate(1), Ok(ProcessArea::Memory));
        assert!(last.validate(2).is_err());

        let dword = ProcessAddress::at_byte(ProcessArea::Memory, PROCESS_AREA_SIZE - 4);
        assert!(dword.validate(4).is_ok());
    }

    #[test]
    fn huge_offset_does_not_overflow() {
        let addr = ProcessAddress::at_byte(ProcessArea::Input, usize::MAX);
        assert!(matches!(
            addr.validate(4),
            Err(ProcessError::ByteOutOfRange { .. })
        ));
    }

    #[test]
    fn display_format() {
        assert_eq!(
            ProcessAddress::new(ProcessArea::Memory, 45, 5).to_string(),
            "MEMORY[45].5"
        );
        assert_eq!(ProcessAddress::from_raw(9, 1, 2).to_string(), "AREA#9[1].2");
    }
}
