//! Prelude module for common re-exports.
//!
//! ```rust
//! use plcio_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, LogLevel, PlcioConfig, ServerConfig, SharedConfig, UpdaterConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    COMMAND_CAPACITY, DEFAULT_CYCLE_TIME_US, MAX_BATCH_BITS, PROCESS_AREA_SIZE,
};

// ─── Process Memory ─────────────────────────────────────────────────
pub use crate::process::{
    BatchError, ProcessAddress, ProcessArea, ProcessData, ProcessError, ProcessResult,
    ProcessValue, TagValue, ValueType,
};

// ─── Drivers ────────────────────────────────────────────────────────
pub use crate::driver::{
    ConnectionId, ConnectionKind, Driver, DriverBuffer, DriverConnection, DriverError,
    DriverResult, DriverUpdater, ModbusConfig, ModbusTransportConfig, ProcessImageReader,
    ProcessImageWriter, Tag,
};

/// Default dispatch tick as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);

/// Default client reply timeout as Duration.
pub const DEFAULT_REPLY_TIMEOUT: Duration =
    Duration::from_millis(crate::consts::DEFAULT_REPLY_TIMEOUT_MS);
