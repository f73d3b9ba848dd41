//! Driver manager.
//!
//! Builds one driver per configured connection through a factory registered
//! for the connection kind, then hands out the aggregation handles. Factories
//! are injected at construction; there is no global registry.

use crate::drivers::{AnyDriver, open_modbus, open_shm};
use crate::error::HalError;
use crate::process::{DriverMap, ProcessReader, ProcessUpdater, ProcessWriter};
use plcio_common::config::UpdaterConfig;
use plcio_common::driver::{ConnectionId, Driver, DriverConnection};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Builds a driver for one connection.
pub type DriverFactory = fn(&DriverConnection) -> Result<AnyDriver, HalError>;

/// Open drivers by connection id.
pub struct DriverManager {
    factories: HashMap<&'static str, DriverFactory>,
    drivers: BTreeMap<ConnectionId, Arc<AnyDriver>>,
}

impl DriverManager {
    /// Manager with no factories.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            drivers: BTreeMap::new(),
        }
    }

    /// Manager with the `shm` and `modbus` factories.
    pub fn with_builtin() -> Self {
        let mut manager = Self::new();
        manager.register("shm", open_shm);
        manager.register("modbus", open_modbus);
        manager
    }

    /// Register the factory for `kind`.
    ///
    /// # Panics
    /// Panics if a factory for `kind` is already registered.
    pub fn register(&mut self, kind: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(kind) {
            panic!("Driver kind '{kind}' is already registered");
        }
        self.factories.insert(kind, factory);
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Open the driver for `connection`.
    ///
    /// # Errors
    /// `DuplicateConnection` if the id is taken, `DriverNotFound` if no
    /// factory handles the kind, or whatever the factory reports.
    pub fn open(&mut self, connection: &DriverConnection) -> Result<(), HalError> {
        let kind = connection.kind.name();
        if self.drivers.contains_key(&connection.id) {
            return Err(HalError::DuplicateConnection { id: connection.id });
        }
        let factory = self
            .factories
            .get(kind)
            .copied()
            .ok_or_else(|| HalError::DriverNotFound {
                kind: kind.to_string(),
            })?;

        let driver = factory(connection)?;
        info!("Opened connection {} ({})", connection.id, driver.name());
        self.drivers.insert(connection.id, Arc::new(driver));
        Ok(())
    }

    /// Open every connection, stopping at the first failure.
    pub fn open_all(&mut self, connections: &[DriverConnection]) -> Result<(), HalError> {
        connections.iter().try_for_each(|c| self.open(c))
    }

    /// Driver for `id`.
    pub fn driver(&self, id: ConnectionId) -> Option<&Arc<AnyDriver>> {
        self.drivers.get(&id)
    }

    /// Open connection ids in ascending order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.drivers.keys().copied().collect()
    }

    fn driver_map(&self) -> DriverMap {
        self.drivers
            .iter()
            .map(|(id, driver)| (*id, Arc::clone(driver) as Arc<dyn Driver>))
            .collect()
    }

    /// Reader over every open driver.
    pub fn reader(&self) -> ProcessReader {
        ProcessReader::new(self.driver_map())
    }

    /// Writer over every open driver.
    pub fn writer(&self) -> ProcessWriter {
        ProcessWriter::new(self.driver_map())
    }

    /// One updater per schedule entry.
    pub fn updaters(&self, schedule: &[UpdaterConfig]) -> Result<Vec<ProcessUpdater>, HalError> {
        schedule
            .iter()
            .map(|entry| {
                let driver = self
                    .drivers
                    .get(&entry.connection)
                    .ok_or(HalError::UnknownConnection { id: entry.connection })?;
                Ok(ProcessUpdater::new(
                    entry.connection,
                    Arc::clone(driver) as Arc<dyn Driver>,
                    entry.interval(),
                ))
            })
            .collect()
    }

    /// Drivers that need their buffer refreshed by a poll thread.
    pub fn pollers(&self) -> Vec<(ConnectionId, Arc<AnyDriver>)> {
        self.drivers
            .iter()
            .filter(|(_, driver)| driver.as_modbus().is_some())
            .map(|(id, driver)| (*id, Arc::clone(driver)))
            .collect()
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcio_common::driver::{ConnectionKind, ModbusConfig, ModbusTransportConfig};

    fn modbus(id: ConnectionId) -> DriverConnection {
        DriverConnection {
            id,
            kind: ConnectionKind::Modbus(ModbusConfig {
                slave_id: 1,
                register_count: 16,
                polling_interval_ms: 50,
                transport: ModbusTransportConfig::Tcp {
                    address: "127.0.0.1".parse().unwrap(),
                    port: 502,
                },
            }),
        }
    }

    fn shm(id: ConnectionId, segment: &str) -> DriverConnection {
        DriverConnection {
            id,
            kind: ConnectionKind::Shm {
                segment: segment.to_string(),
            },
        }
    }

    #[test]
    fn opens_modbus_without_connecting() {
        let mut manager = DriverManager::with_builtin();
        manager.open_all(&[modbus(1), modbus(2)]).unwrap();
        assert_eq!(manager.connection_ids(), vec![1, 2]);
        assert_eq!(manager.pollers().len(), 2);
        assert_eq!(manager.driver(1).unwrap().name(), "modbus");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut manager = DriverManager::with_builtin();
        manager.open(&modbus(4)).unwrap();
        let err = manager.open(&modbus(4)).unwrap_err();
        assert!(matches!(err, HalError::DuplicateConnection { id: 4 }));
    }

    #[test]
    fn unknown_kind_not_found() {
        let mut manager = DriverManager::new();
        let err = manager.open(&modbus(1)).unwrap_err();
        assert!(matches!(err, HalError::DriverNotFound { ref kind } if kind == "modbus"));
    }

    #[test]
    fn factory_rejects_other_kind() {
        let err = open_shm(&modbus(3)).err().unwrap();
        assert!(matches!(err, HalError::KindMismatch { id: 3, factory: "shm", kind: "modbus" }));
    }

    #[test]
    fn missing_region_fails_shm_open() {
        let mut manager = DriverManager::with_builtin();
        let segment = format!("hal_mgr_absent_{}", std::process::id());
        let err = manager.open(&shm(7, &segment)).unwrap_err();
        assert!(matches!(err, HalError::Driver { id: 7, .. }));
        assert!(manager.connection_ids().is_empty());
    }

    #[test]
    fn updaters_follow_schedule() {
        let mut manager = DriverManager::with_builtin();
        manager.open(&modbus(1)).unwrap();

        let updaters = manager
            .updaters(&[UpdaterConfig {
                connection: 1,
                interval_ms: 20,
            }])
            .unwrap();
        assert_eq!(updaters.len(), 1);
        assert_eq!(updaters[0].interval(), std::time::Duration::from_millis(20));

        let err = manager
            .updaters(&[UpdaterConfig {
                connection: 5,
                interval_ms: 20,
            }])
            .err()
            .unwrap();
        assert!(matches!(err, HalError::UnknownConnection { id: 5 }));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_kind_panics() {
        let mut manager = DriverManager::with_builtin();
        manager.register("shm", open_shm);
    }
}
