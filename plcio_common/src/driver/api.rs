//! Driver capability traits and error types.
//!
//! A driver exposes four handles, each scoped to the driver instance:
//!
//! | Handle               | Role                                             |
//! |----------------------|--------------------------------------------------|
//! | `DriverBuffer`       | I/O refresh against the transport                |
//! | `DriverUpdater`      | Publish the refreshed buffer as the live image   |
//! | `ProcessImageReader` | Typed reads from the live image                  |
//! | `ProcessImageWriter` | Typed writes through to the transport and image  |
//!
//! Every handle takes `&self`; implementations own their locking so that a
//! handle can be shared by the reader, writer and updater threads.

use crate::driver::tag::Tag;
use crate::process::{BatchError, ProcessAddress, ProcessArea, ProcessError, TagValue, ValueType};
use thiserror::Error;

/// Identifier of a configured driver connection.
pub type ConnectionId = u16;

/// Boxed error raised by a lower layer this crate does not depend on.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Address rejected by process memory validation.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A batch stopped part-way; entries before `index` were applied.
    #[error("batch stopped at entry {index}")]
    Batch {
        /// Index of the failing entry
        index: usize,
        /// Validation error of the failing entry
        #[source]
        source: ProcessError,
    },

    /// Modbus wire operation failed. The connection has been dropped.
    #[error("modbus {operation} failed")]
    Transport {
        /// Wire operation that failed
        operation: &'static str,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Shared memory region operation failed.
    #[error("shared memory {operation} failed")]
    SharedMemory {
        /// Region operation that failed
        operation: &'static str,
        /// Underlying region error
        #[source]
        source: BoxedSource,
    },

    /// Writes to this area are not accepted by the driver.
    #[error("area {area} is read-only")]
    ReadOnlyArea {
        /// Rejected area
        area: ProcessArea,
    },

    /// Address maps past the configured register count.
    #[error("register {register} out of range (count {count})")]
    RegisterOutOfRange {
        /// First register outside the map
        register: usize,
        /// Configured register count
        count: u16,
    },

    /// Value type does not match the tag type.
    #[error("type mismatch: tag is {expected}, value is {actual}")]
    TypeMismatch {
        /// Type declared by the tag
        expected: ValueType,
        /// Type of the supplied value
        actual: ValueType,
    },

    /// Error raised while serving a tag.
    #[error("tag {tag}")]
    Tag {
        /// Tag being served
        tag: Tag,
        /// Driver error
        #[source]
        source: Box<DriverError>,
    },
}

impl DriverError {
    /// Attach tag context.
    pub fn for_tag(self, tag: Tag) -> Self {
        DriverError::Tag {
            tag,
            source: Box::new(self),
        }
    }

    /// Innermost error, with tag context removed.
    pub fn root(&self) -> &DriverError {
        match self {
            DriverError::Tag { source, .. } => source.root(),
            other => other,
        }
    }
}

impl<T: std::fmt::Debug> From<BatchError<T>> for DriverError {
    fn from(err: BatchError<T>) -> Self {
        DriverError::Batch {
            index: err.index,
            source: err.source,
        }
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// I/O refresh handle.
pub trait DriverBuffer: Send + Sync {
    /// Exchange data with the transport into the driver's load buffer.
    fn refresh(&self) -> DriverResult<()>;
}

/// Live snapshot update handle.
pub trait DriverUpdater: Send + Sync {
    /// Publish the load buffer as the live snapshot.
    fn update(&self) -> DriverResult<()>;
}

/// Typed reads from the live process image.
pub trait ProcessImageReader: Send + Sync {
    /// Read one bit.
    fn read_bit(&self, addr: ProcessAddress) -> DriverResult<bool>;
    /// Read a byte.
    fn read_byte(&self, addr: ProcessAddress) -> DriverResult<u8>;
    /// Read a 16-bit word.
    fn read_word(&self, addr: ProcessAddress) -> DriverResult<u16>;
    /// Read a 32-bit double word.
    fn read_dword(&self, addr: ProcessAddress) -> DriverResult<u32>;
    /// Read a signed 32-bit integer.
    fn read_int(&self, addr: ProcessAddress) -> DriverResult<i32>;
    /// Read a 32-bit real.
    fn read_real(&self, addr: ProcessAddress) -> DriverResult<f32>;
    /// Read bits left to right, stopping at the first invalid address.
    fn read_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<Vec<bool>>;

    /// Read a value of type `value_type` at `addr`.
    fn read_value(&self, addr: ProcessAddress, value_type: ValueType) -> DriverResult<TagValue> {
        Ok(match value_type {
            ValueType::Bit => TagValue::Bit(self.read_bit(addr)?),
            ValueType::Byte => TagValue::Byte(self.read_byte(addr)?),
            ValueType::Word => TagValue::Word(self.read_word(addr)?),
            ValueType::DWord => TagValue::DWord(self.read_dword(addr)?),
            ValueType::Int => TagValue::Int(self.read_int(addr)?),
            ValueType::Real => TagValue::Real(self.read_real(addr)?),
        })
    }
}

/// Typed writes to the process image.
pub trait ProcessImageWriter: Send + Sync {
    /// Write one bit.
    fn write_bit(&self, addr: ProcessAddress, value: bool) -> DriverResult<()>;

    /// Set one bit.
    fn set_bit(&self, addr: ProcessAddress) -> DriverResult<()> {
        self.write_bit(addr, true)
    }

    /// Reset one bit.
    fn reset_bit(&self, addr: ProcessAddress) -> DriverResult<()> {
        self.write_bit(addr, false)
    }

    /// Toggle one bit.
    fn invert_bit(&self, addr: ProcessAddress) -> DriverResult<()>;
    /// Write a byte.
    fn write_byte(&self, addr: ProcessAddress, value: u8) -> DriverResult<()>;
    /// Write a 16-bit word.
    fn write_word(&self, addr: ProcessAddress, value: u16) -> DriverResult<()>;
    /// Write a 32-bit double word.
    fn write_dword(&self, addr: ProcessAddress, value: u32) -> DriverResult<()>;
    /// Write a signed 32-bit integer.
    fn write_int(&self, addr: ProcessAddress, value: i32) -> DriverResult<()>;
    /// Write a 32-bit real.
    fn write_real(&self, addr: ProcessAddress, value: f32) -> DriverResult<()>;
    /// Set bits left to right, stopping at the first invalid address.
    fn set_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<()>;

    /// Write a typed value at `addr`.
    fn write_value(&self, addr: ProcessAddress, value: TagValue) -> DriverResult<()> {
        match value {
            TagValue::Bit(v) => self.write_bit(addr, v),
            TagValue::Byte(v) => self.write_byte(addr, v),
            TagValue::Word(v) => self.write_word(addr, v),
            TagValue::DWord(v) => self.write_dword(addr, v),
            TagValue::Int(v) => self.write_int(addr, v),
            TagValue::Real(v) => self.write_real(addr, v),
        }
    }
}

/// A process image driver.
///
/// Drivers are shared across the reader, writer and updater threads, so
/// every handle is reached through `&self`.
pub trait Driver: Send + Sync {
    /// Short driver kind name (e.g. "shm", "modbus").
    fn name(&self) -> &'static str;

    /// Refresh handle.
    fn buffer(&self) -> &dyn DriverBuffer;

    /// Reader handle.
    fn reader(&self) -> &dyn ProcessImageReader;

    /// Writer handle.
    fn writer(&self) -> &dyn ProcessImageWriter;

    /// Updater handle.
    fn updater(&self) -> &dyn DriverUpdater;
}
