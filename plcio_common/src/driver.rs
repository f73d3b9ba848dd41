//! Driver capability traits, tags and connection configuration.
//!
//! This module contains:
//! - `api`: the `Driver` trait, its handle traits and `DriverError`
//! - `tag`: `Tag`, a typed address bound to one driver connection
//! - `config`: `DriverConnection` and transport settings

pub mod api;
pub mod config;
pub mod tag;

pub use api::{
    ConnectionId, Driver, DriverBuffer, DriverError, DriverResult, DriverUpdater,
    ProcessImageReader, ProcessImageWriter,
};
pub use config::{ConnectionKind, DriverConnection, ModbusConfig, ModbusTransportConfig, Parity};
pub use tag::Tag;
