//! System-wide constants for the plcio workspace.
//!
//! Single source of truth for buffer capacities, wire limits and default
//! timings. Imported by all crates.

/// Size in bytes of each process area (INPUT, OUTPUT, MEMORY).
///
/// Every byte offset of an area fits the one-byte offset field of the
/// command protocol.
pub const PROCESS_AREA_SIZE: usize = 256;

/// Number of process areas held by one `ProcessData`.
pub const PROCESS_AREA_COUNT: usize = 3;

/// Capacity in bytes of the `values` payload of a command record.
///
/// A submitted record must have `length < COMMAND_CAPACITY`.
pub const COMMAND_CAPACITY: usize = 256;

/// Maximum number of `[area, byte, bit]` triples in one SET_BITS command.
pub const MAX_BATCH_BITS: usize = COMMAND_CAPACITY / 3;

/// Default dispatch loop tick in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Default time a client waits for a reply before giving up, in milliseconds.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 100;

/// Default Modbus polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Largest register count a Modbus master may read in one request.
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Largest register count a Modbus master may write in one request.
pub const MODBUS_MAX_WRITE_REGISTERS: u16 = 123;

/// Largest register map a Modbus connection may declare: two bytes per
/// register must fit one process area.
pub const MODBUS_MAX_REGISTER_COUNT: u16 = (PROCESS_AREA_SIZE / 2) as u16;

/// Default Modbus TCP port.
pub const MODBUS_TCP_PORT: u16 = 502;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/plcio/plcio.toml";
