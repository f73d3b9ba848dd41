//! Addressing errors for typed process memory.

use std::fmt;
use thiserror::Error;

/// Error returned when an address does not resolve inside `ProcessData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Bit offset greater than 7.
    #[error("bit offset {bit} out of range (0-7)")]
    BitOutOfRange {
        /// Requested bit offset
        bit: u8,
    },

    /// Value does not fit inside the area at the requested byte offset.
    #[error("byte offset {byte} (width {width}) out of range")]
    ByteOutOfRange {
        /// Requested byte offset
        byte: usize,
        /// Width in bytes of the accessed value
        width: usize,
    },

    /// Area code is not INPUT, OUTPUT or MEMORY.
    #[error("area code {area} out of range")]
    AreaOutOfRange {
        /// Raw area code
        area: u8,
    },
}

impl ProcessError {
    /// Stable one-byte sub-code carried in NOK replies.
    pub const fn code(&self) -> u8 {
        match self {
            Self::BitOutOfRange { .. } => 1,
            Self::ByteOutOfRange { .. } => 2,
            Self::AreaOutOfRange { .. } => 3,
        }
    }
}

/// Result type for process memory operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// A batch operation stopped part-way through its address list.
///
/// Entries `0..index` were applied (or read into `partial`); the entry at
/// `index` failed with `source`; nothing after it was touched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("batch stopped at entry {index}: {source}")]
pub struct BatchError<T: fmt::Debug = ()> {
    /// Index of the failing entry, equal to the number of applied entries.
    pub index: usize,
    /// Results gathered before the failure.
    pub partial: T,
    /// Validation error of the failing entry.
    #[source]
    pub source: ProcessError,
}

impl<T: fmt::Debug> BatchError<T> {
    /// Number of entries applied before the failure.
    pub fn applied(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_codes_are_distinct() {
        let codes = [
            ProcessError::BitOutOfRange { bit: 9 }.code(),
            ProcessError::ByteOutOfRange { byte: 0, width: 1 }.code(),
            ProcessError::AreaOutOfRange { area: 5 }.code(),
        ];
        assert_eq!(codes, [1, 2, 3]);
    }

    #[test]
    fn batch_error_display_names_entry() {
        let err = BatchError {
            index: 2,
            partial: (),
            source: ProcessError::BitOutOfRange { bit: 70 },
        };
        let text = err.to_string();
        assert!(text.contains("entry 2"));
        assert!(text.contains("70"));
        assert_eq!(err.applied(), 2);
    }
}
