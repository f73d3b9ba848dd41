//! Driver implementations.
//!
//! - [`shm`] - client of a region hosted by a plcio server
//! - [`modbus`] - Modbus master over TCP or serial RTU
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `Driver` and its handles from `plcio_common::driver`
//! 3. Add a variant to [`AnyDriver`] and delegate to it
//! 4. Register a factory for its connection kind in `DriverManager::with_builtin`

pub mod modbus;
pub mod shm;

pub use modbus::ModbusDriver;
pub use shm::ShmDriver;

use crate::error::HalError;
use plcio_common::driver::{
    ConnectionKind, Driver, DriverBuffer, DriverConnection, DriverResult, DriverUpdater,
    ProcessImageReader, ProcessImageWriter,
};

/// One of the built-in drivers.
pub enum AnyDriver {
    /// Shared-memory client
    Shm(ShmDriver),
    /// Modbus master
    Modbus(ModbusDriver),
}

impl AnyDriver {
    /// The Modbus driver, if this is one.
    pub fn as_modbus(&self) -> Option<&ModbusDriver> {
        match self {
            AnyDriver::Modbus(driver) => Some(driver),
            AnyDriver::Shm(_) => None,
        }
    }

    fn inner(&self) -> &dyn Driver {
        match self {
            AnyDriver::Shm(driver) => driver,
            AnyDriver::Modbus(driver) => driver,
        }
    }
}

impl Driver for AnyDriver {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn buffer(&self) -> &dyn DriverBuffer {
        self.inner().buffer()
    }

    fn reader(&self) -> &dyn ProcessImageReader {
        self.inner().reader()
    }

    fn writer(&self) -> &dyn ProcessImageWriter {
        self.inner().writer()
    }

    fn updater(&self) -> &dyn DriverUpdater {
        self.inner().updater()
    }
}

fn kind_mismatch(connection: &DriverConnection, factory: &'static str) -> HalError {
    HalError::KindMismatch {
        id: connection.id,
        factory,
        kind: connection.kind.name(),
    }
}

fn opened(connection: &DriverConnection, driver: DriverResult<AnyDriver>) -> Result<AnyDriver, HalError> {
    driver.map_err(|source| HalError::Driver {
        id: connection.id,
        source,
    })
}

/// Factory for the `shm` kind.
pub fn open_shm(connection: &DriverConnection) -> Result<AnyDriver, HalError> {
    match &connection.kind {
        ConnectionKind::Shm { segment } => {
            opened(connection, ShmDriver::attach(segment).map(AnyDriver::Shm))
        }
        _ => Err(kind_mismatch(connection, "shm")),
    }
}

/// Factory for the `modbus` kind.
pub fn open_modbus(connection: &DriverConnection) -> Result<AnyDriver, HalError> {
    match &connection.kind {
        ConnectionKind::Modbus(config) => Ok(AnyDriver::Modbus(ModbusDriver::new(config.clone()))),
        _ => Err(kind_mismatch(connection, "modbus")),
    }
}
