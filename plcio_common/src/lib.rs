//! plcio Common Library
//!
//! Process memory addressing, tags, driver capability traits and
//! configuration loading shared by every plcio crate.
//!
//! # Module Structure
//!
//! - [`consts`] - Buffer capacities, wire limits and default timings
//! - [`process`] - Typed process memory (`ProcessData`, `ProcessAddress`)
//! - [`driver`] - `Driver` capability traits, `Tag`, connection config
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use plcio_common::prelude::*;
//!
//! let mut data = ProcessData::new();
//! let addr = ProcessAddress::new(ProcessArea::Memory, 45, 5);
//! data.set_bit(addr).unwrap();
//! assert!(data.get_bit(addr).unwrap());
//! ```

pub mod config;
pub mod consts;
pub mod driver;
pub mod prelude;
pub mod process;
