//! Typed process memory.
//!
//! This module contains:
//! - `address`: `ProcessArea` and `ProcessAddress` (area code, byte, bit).
//! - `value`: `ProcessValue` little-endian codecs and the `ValueType` set.
//! - `data`: `ProcessData`, the three fixed-size byte areas and their typed
//!   get/set operations.
//! - `error`: addressing and batch errors.
//!
//! ## Validation Order
//!
//! Every access is validated in a fixed order, first failure wins:
//!
//! 1. bit offset ≤ 7 → else `BitOutOfRange`
//! 2. byte offset + width − 1 < `PROCESS_AREA_SIZE` → else `ByteOutOfRange`
//! 3. area code ∈ {INPUT, OUTPUT, MEMORY} → else `AreaOutOfRange`

pub mod address;
pub mod data;
pub mod error;
pub mod value;

pub use address::{ProcessAddress, ProcessArea};
pub use data::ProcessData;
pub use error::{BatchError, ProcessError, ProcessResult};
pub use value::{ProcessValue, TagValue, ValueType};
