//! Shared-memory client driver.
//!
//! Reads and writes go straight to the process image of an attached region.
//! The region already is the live snapshot, so `refresh` and `update` have
//! nothing to do.

use plcio_common::driver::{
    Driver, DriverBuffer, DriverError, DriverResult, DriverUpdater, ProcessImageReader,
    ProcessImageWriter,
};
use plcio_common::process::{ProcessAddress, ProcessData, ProcessResult};
use plcio_shared_memory::{RegionClient, ShmError};
use std::time::Duration;
use tracing::info;

fn shm_error(operation: &'static str) -> impl FnOnce(ShmError) -> DriverError {
    move |e| DriverError::SharedMemory {
        operation,
        source: Box::new(e),
    }
}

/// Driver over a region hosted by another process (or thread).
pub struct ShmDriver {
    client: RegionClient,
}

impl ShmDriver {
    /// Attach to the region named `segment`.
    pub fn attach(segment: &str) -> DriverResult<Self> {
        let client = RegionClient::attach(segment).map_err(shm_error("attach"))?;
        info!("Shared memory driver attached to '{}'", segment);
        Ok(Self { client })
    }

    /// Driver over an existing client.
    pub fn new(client: RegionClient) -> Self {
        Self { client }
    }

    /// Region client used by this driver.
    pub fn client(&self) -> &RegionClient {
        &self.client
    }

    /// Check that the region server answers, returning the round-trip time.
    pub fn ping(&self, timeout: Duration) -> DriverResult<Duration> {
        self.client.ping(timeout).map_err(shm_error("ping"))
    }

    fn with_data<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut ProcessData) -> ProcessResult<R>,
    ) -> DriverResult<R> {
        let result = self
            .client
            .region()
            .access_process_data(f)
            .map_err(shm_error(operation))?;
        Ok(result?)
    }
}

impl DriverBuffer for ShmDriver {
    fn refresh(&self) -> DriverResult<()> {
        Ok(())
    }
}

impl DriverUpdater for ShmDriver {
    fn update(&self) -> DriverResult<()> {
        Ok(())
    }
}

impl ProcessImageReader for ShmDriver {
    fn read_bit(&self, addr: ProcessAddress) -> DriverResult<bool> {
        self.with_data("read", |d| d.get_bit(addr))
    }

    fn read_byte(&self, addr: ProcessAddress) -> DriverResult<u8> {
        self.with_data("read", |d| d.get_byte(addr))
    }

    fn read_word(&self, addr: ProcessAddress) -> DriverResult<u16> {
        self.with_data("read", |d| d.get_word(addr))
    }

    fn read_dword(&self, addr: ProcessAddress) -> DriverResult<u32> {
        self.with_data("read", |d| d.get_dword(addr))
    }

    fn read_int(&self, addr: ProcessAddress) -> DriverResult<i32> {
        self.with_data("read", |d| d.get_int(addr))
    }

    fn read_real(&self, addr: ProcessAddress) -> DriverResult<f32> {
        self.with_data("read", |d| d.get_real(addr))
    }

    fn read_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<Vec<bool>> {
        let bits = self
            .client
            .region()
            .access_process_data(|d| d.get_bits(addrs))
            .map_err(shm_error("read"))?;
        Ok(bits?)
    }
}

impl ProcessImageWriter for ShmDriver {
    fn write_bit(&self, addr: ProcessAddress, value: bool) -> DriverResult<()> {
        self.with_data("write", |d| d.write_bit(addr, value))
    }

    fn invert_bit(&self, addr: ProcessAddress) -> DriverResult<()> {
        self.with_data("write", |d| d.invert_bit(addr))
    }

    fn write_byte(&self, addr: ProcessAddress, value: u8) -> DriverResult<()> {
        self.with_data("write", |d| d.set_byte(addr, value))
    }

    fn write_word(&self, addr: ProcessAddress, value: u16) -> DriverResult<()> {
        self.with_data("write", |d| d.set_word(addr, value))
    }

    fn write_dword(&self, addr: ProcessAddress, value: u32) -> DriverResult<()> {
        self.with_data("write", |d| d.set_dword(addr, value))
    }

    fn write_int(&self, addr: ProcessAddress, value: i32) -> DriverResult<()> {
        self.with_data("write", |d| d.set_int(addr, value))
    }

    fn write_real(&self, addr: ProcessAddress, value: f32) -> DriverResult<()> {
        self.with_data("write", |d| d.set_real(addr, value))
    }

    fn set_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<()> {
        let applied = self
            .client
            .region()
            .access_process_data(|d| d.set_bits(addrs))
            .map_err(shm_error("write"))?;
        Ok(applied?)
    }
}

impl Driver for ShmDriver {
    fn name(&self) -> &'static str {
        "shm"
    }

    fn buffer(&self) -> &dyn DriverBuffer {
        self
    }

    fn reader(&self) -> &dyn ProcessImageReader {
        self
    }

    fn writer(&self) -> &dyn ProcessImageWriter {
        self
    }

    fn updater(&self) -> &dyn DriverUpdater {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcio_common::process::{ProcessArea, ProcessError};
    use plcio_shared_memory::{CommandDispatcher, SharedMemoryRegion};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn unique(tag: &str) -> String {
        format!("hal_shm_{}_{}", tag, std::process::id())
    }

    #[test]
    fn writes_are_visible_to_the_server() {
        let name = unique("write");
        let server = SharedMemoryRegion::create(&name).unwrap();
        let driver = ShmDriver::attach(&name).unwrap();

        let addr = ProcessAddress::at_byte(ProcessArea::Output, 4);
        driver.write_dword(addr, 0xDEAD_BEEF).unwrap();
        driver.set_bit(ProcessAddress::new(ProcessArea::Memory, 45, 5)).unwrap();

        let (dword, byte) = server
            .access_process_data(|d| {
                (
                    d.get_dword(addr).unwrap(),
                    d.area(ProcessArea::Memory)[45],
                )
            })
            .unwrap();
        assert_eq!(dword, 0xDEAD_BEEF);
        assert_eq!(byte, 1 << 5);

        drop(driver);
        server.destroy().unwrap();
    }

    #[test]
    fn reads_see_server_writes() {
        let name = unique("read");
        let server = SharedMemoryRegion::create(&name).unwrap();
        server
            .access_process_data(|d| d.set_real(ProcessAddress::at_byte(ProcessArea::Input, 8), 2.5))
            .unwrap()
            .unwrap();

        let driver = ShmDriver::attach(&name).unwrap();
        let value = driver.read_real(ProcessAddress::at_byte(ProcessArea::Input, 8)).unwrap();
        assert_eq!(value, 2.5);

        drop(driver);
        server.destroy().unwrap();
    }

    #[test]
    fn addressing_errors_pass_through() {
        let name = unique("errors");
        let server = SharedMemoryRegion::create(&name).unwrap();
        let driver = ShmDriver::attach(&name).unwrap();

        let err = driver
            .read_bit(ProcessAddress::new(ProcessArea::Input, 0, 70))
            .unwrap_err();
        assert!(matches!(err, DriverError::Process(ProcessError::BitOutOfRange { bit: 70 })));

        let err = driver
            .set_bits(&[
                ProcessAddress::new(ProcessArea::Memory, 0, 1),
                ProcessAddress::from_raw(5, 0, 0),
            ])
            .unwrap_err();
        assert!(matches!(err, DriverError::Batch { index: 1, .. }));
        assert!(driver.read_bit(ProcessAddress::new(ProcessArea::Memory, 0, 1)).unwrap());

        drop(driver);
        server.destroy().unwrap();
    }

    #[test]
    fn attach_without_server_is_shared_memory_error() {
        let err = ShmDriver::attach(&unique("absent")).err().unwrap();
        assert!(matches!(err, DriverError::SharedMemory { operation: "attach", .. }));
    }

    #[test]
    fn ping_reaches_dispatch_loop() {
        let name = unique("ping");
        let region = SharedMemoryRegion::create(&name).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let server = std::thread::spawn(move || {
            let mut dispatcher = CommandDispatcher::new(region);
            dispatcher.run(&flag, Duration::from_micros(200)).unwrap();
            dispatcher.into_region()
        });

        let driver = ShmDriver::attach(&name).unwrap();
        assert!(driver.ping(Duration::from_secs(1)).is_ok());

        running.store(false, Ordering::SeqCst);
        drop(driver);
        server.join().unwrap().destroy().unwrap();
    }
}
