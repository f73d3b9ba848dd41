//! Process aggregation layer.
//!
//! [`ProcessReader`] and [`ProcessWriter`] route each tag to the driver of
//! its connection id. [`ProcessUpdater`] publishes one driver's refreshed
//! buffer on its own schedule. There is no aggregation-wide lock: two tags
//! on different connections are never read consistently with each other.

use plcio_common::driver::{
    ConnectionId, Driver, DriverError, DriverResult, ProcessImageReader, ProcessImageWriter, Tag,
};
use plcio_common::process::TagValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Drivers by connection id.
pub type DriverMap = BTreeMap<ConnectionId, Arc<dyn Driver>>;

/// Driver for `tag`. A tag without a driver is a wiring bug, not a runtime
/// condition.
fn driver_for<'a>(drivers: &'a DriverMap, tag: &Tag) -> &'a dyn Driver {
    match drivers.get(&tag.connection_id) {
        Some(driver) => driver.as_ref(),
        None => panic!("no driver for connection {} (tag {})", tag.connection_id, tag),
    }
}

/// Typed reads by tag.
#[derive(Clone)]
pub struct ProcessReader {
    drivers: Arc<DriverMap>,
}

impl ProcessReader {
    /// Reader over `drivers`.
    pub fn new(drivers: DriverMap) -> Self {
        Self {
            drivers: Arc::new(drivers),
        }
    }

    fn reader(&self, tag: &Tag) -> &dyn ProcessImageReader {
        driver_for(&self.drivers, tag).reader()
    }

    /// Read a bit.
    pub fn read_bit(&self, tag: &Tag) -> DriverResult<bool> {
        self.reader(tag).read_bit(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read a byte.
    pub fn read_byte(&self, tag: &Tag) -> DriverResult<u8> {
        self.reader(tag).read_byte(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read a word.
    pub fn read_word(&self, tag: &Tag) -> DriverResult<u16> {
        self.reader(tag).read_word(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read a double word.
    pub fn read_dword(&self, tag: &Tag) -> DriverResult<u32> {
        self.reader(tag).read_dword(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read a signed integer.
    pub fn read_int(&self, tag: &Tag) -> DriverResult<i32> {
        self.reader(tag).read_int(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read a real.
    pub fn read_real(&self, tag: &Tag) -> DriverResult<f32> {
        self.reader(tag).read_real(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Read several bits, possibly from different connections.
    pub fn read_bits(&self, tags: &[Tag]) -> DriverResult<Vec<bool>> {
        tags.iter().map(|tag| self.read_bit(tag)).collect()
    }

    /// Read the value of `tag` as its declared type.
    pub fn read(&self, tag: &Tag) -> DriverResult<TagValue> {
        self.reader(tag)
            .read_value(tag.address, tag.value_type)
            .map_err(|e| e.for_tag(*tag))
    }
}

/// Typed writes by tag.
#[derive(Clone)]
pub struct ProcessWriter {
    drivers: Arc<DriverMap>,
}

impl ProcessWriter {
    /// Writer over `drivers`.
    pub fn new(drivers: DriverMap) -> Self {
        Self {
            drivers: Arc::new(drivers),
        }
    }

    fn writer(&self, tag: &Tag) -> &dyn ProcessImageWriter {
        driver_for(&self.drivers, tag).writer()
    }

    /// Write a bit.
    pub fn write_bit(&self, tag: &Tag, value: bool) -> DriverResult<()> {
        self.writer(tag).write_bit(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Set a bit to 1.
    pub fn set_bit(&self, tag: &Tag) -> DriverResult<()> {
        self.writer(tag).set_bit(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Reset a bit to 0.
    pub fn reset_bit(&self, tag: &Tag) -> DriverResult<()> {
        self.writer(tag).reset_bit(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Invert a bit.
    pub fn invert_bit(&self, tag: &Tag) -> DriverResult<()> {
        self.writer(tag).invert_bit(tag.address).map_err(|e| e.for_tag(*tag))
    }

    /// Write a byte.
    pub fn write_byte(&self, tag: &Tag, value: u8) -> DriverResult<()> {
        self.writer(tag).write_byte(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Write a word.
    pub fn write_word(&self, tag: &Tag, value: u16) -> DriverResult<()> {
        self.writer(tag).write_word(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Write a double word.
    pub fn write_dword(&self, tag: &Tag, value: u32) -> DriverResult<()> {
        self.writer(tag).write_dword(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Write a signed integer.
    pub fn write_int(&self, tag: &Tag, value: i32) -> DriverResult<()> {
        self.writer(tag).write_int(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Write a real.
    pub fn write_real(&self, tag: &Tag, value: f32) -> DriverResult<()> {
        self.writer(tag).write_real(tag.address, value).map_err(|e| e.for_tag(*tag))
    }

    /// Set several bits in order, stopping at the first failure.
    pub fn set_bits(&self, tags: &[Tag]) -> DriverResult<()> {
        tags.iter().try_for_each(|tag| self.set_bit(tag))
    }

    /// Write `value`, which must have the declared type of `tag`.
    pub fn write(&self, tag: &Tag, value: TagValue) -> DriverResult<()> {
        if value.value_type() != tag.value_type {
            return Err(DriverError::TypeMismatch {
                expected: tag.value_type,
                actual: value.value_type(),
            }
            .for_tag(*tag));
        }
        self.writer(tag)
            .write_value(tag.address, value)
            .map_err(|e| e.for_tag(*tag))
    }
}

/// Publishes one driver's buffer at a fixed interval.
pub struct ProcessUpdater {
    connection_id: ConnectionId,
    driver: Arc<dyn Driver>,
    interval: Duration,
}

impl ProcessUpdater {
    /// Updater for `driver`.
    pub fn new(connection_id: ConnectionId, driver: Arc<dyn Driver>, interval: Duration) -> Self {
        Self {
            connection_id,
            driver,
            interval,
        }
    }

    /// Connection served.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Update period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the driver's updater once.
    pub fn update(&self) -> DriverResult<()> {
        self.driver.updater().update()
    }
}
