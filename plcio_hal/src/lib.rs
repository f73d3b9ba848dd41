//! # plcio HAL Library
//!
//! Drivers, aggregation layer and runtime core for plcio.
//!
//! Drivers implement the capability traits defined in
//! `plcio_common::driver`.
//!
//! # Module Structure
//!
//! - [`core`] - PlcioCore, worker threads and dispatch loop hosting
//! - [`manager`] - Driver factories and open connections
//! - [`drivers`] - Shared-memory and Modbus drivers
//! - [`process`] - Tag-based reader, writer and updater
//! - [`error`] - Runtime error type
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    plcio_hal (single crate)                      │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ SHM region  │◄──►│  PlcioCore   │◄──►│  DriverManager      │  │
//! │  │ (dispatch)  │    │  (threads)   │    │                     │  │
//! │  └─────────────┘    └──────┬───────┘    └──────────┬──────────┘  │
//! │                            │                       │             │
//! │                            ▼                       ▼             │
//! │                   ┌────────────────┐    ┌─────────────────────┐  │
//! │                   │ ProcessUpdater │    │ ProcessReader/Writer│  │
//! │                   └────────────────┘    └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

pub mod core;
pub mod drivers;
pub mod error;
pub mod manager;
pub mod process;

pub use crate::core::{LoopStats, PlcioCore};
pub use crate::drivers::{AnyDriver, ModbusDriver, ShmDriver};
pub use crate::error::HalError;
pub use crate::manager::{DriverFactory, DriverManager};
pub use crate::process::{DriverMap, ProcessReader, ProcessUpdater, ProcessWriter};
