//! Modbus master driver.
//!
//! INPUT mirrors the input registers, OUTPUT mirrors the holding registers
//! and MEMORY is a driver-local scratch area (see [`registers`] for the
//! byte layout).
//!
//! # Locking
//!
//! ```text
//! transport ─ Link { connector, connection }   one wire operation at a time
//! buffers   ─ { live, load }                   snapshot handed to readers
//! ```
//!
//! The two locks are never held together. `refresh` fills a private staging
//! image under the transport lock and only then copies it into `load`;
//! `update` copies `load` into `live`. OUTPUT writes read-modify-write the
//! covered holding registers under the transport lock, then patch the
//! addressed bytes of `live` and `load` and bump the write generation. A
//! refresh that started before such a write keeps its INPUT image but drops
//! its OUTPUT image, which may predate the write.

pub mod registers;
pub mod transport;

pub use transport::{Connector, ModbusTransport, connector};

use parking_lot::Mutex;
use plcio_common::consts::MODBUS_MAX_READ_REGISTERS;
use plcio_common::driver::{
    Driver, DriverBuffer, DriverError, DriverResult, DriverUpdater, ModbusConfig,
    ProcessImageReader, ProcessImageWriter,
};
use plcio_common::process::{ProcessAddress, ProcessArea, ProcessData, ProcessResult};
use registers::{chunks, pack, register_span, unpack};
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

struct Link {
    connect: Connector,
    connection: Option<Box<dyn ModbusTransport>>,
}

impl Link {
    /// Run one wire operation, connecting first if needed.
    ///
    /// A failed operation drops the connection; the next call reconnects.
    fn call<R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn ModbusTransport) -> io::Result<R>,
    ) -> DriverResult<R> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                debug!("Opening Modbus connection");
                (self.connect)().map_err(|source| DriverError::Transport {
                    operation: "connect",
                    source,
                })?
            }
        };

        match f(connection.as_mut()) {
            Ok(value) => {
                self.connection = Some(connection);
                Ok(value)
            }
            Err(source) => {
                warn!("Modbus {} failed, dropping connection: {}", operation, source);
                Err(DriverError::Transport { operation, source })
            }
        }
    }

    fn read(
        &mut self,
        operation: &'static str,
        count: u16,
        f: impl FnOnce(&mut dyn ModbusTransport) -> io::Result<Vec<u16>>,
    ) -> DriverResult<Vec<u16>> {
        let registers = self.call(operation, f)?;
        if registers.len() < usize::from(count) {
            self.connection = None;
            return Err(DriverError::Transport {
                operation,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected {} registers, got {}", count, registers.len()),
                ),
            });
        }
        Ok(registers)
    }
}

struct Buffers {
    live: ProcessData,
    load: ProcessData,
    /// Bumped by every OUTPUT write.
    output_writes: u64,
}

/// Registers read by one refresh, not yet copied into `load`.
struct Staged {
    image: ProcessData,
    output_writes: u64,
}

/// Modbus master over one slave.
pub struct ModbusDriver {
    config: ModbusConfig,
    transport: Mutex<Link>,
    buffers: Mutex<Buffers>,
}

impl ModbusDriver {
    /// Driver for the configured TCP or RTU slave. Connects on first use.
    pub fn new(config: ModbusConfig) -> Self {
        let connect = connector(&config);
        Self::with_connector(config, connect)
    }

    /// Driver using `connect` to open its transport.
    pub fn with_connector(config: ModbusConfig, connect: Connector) -> Self {
        Self {
            config,
            transport: Mutex::new(Link {
                connect,
                connection: None,
            }),
            buffers: Mutex::new(Buffers {
                live: ProcessData::new(),
                load: ProcessData::new(),
                output_writes: 0,
            }),
        }
    }

    /// Connection settings.
    pub fn config(&self) -> &ModbusConfig {
        &self.config
    }

    /// How often the buffer should be refreshed.
    pub fn polling_interval(&self) -> Duration {
        self.config.polling_interval()
    }

    fn check_registers(&self, first: usize, count: usize) -> DriverResult<()> {
        let last = first + count - 1;
        if last >= usize::from(self.config.register_count) {
            return Err(DriverError::RegisterOutOfRange {
                register: last,
                count: self.config.register_count,
            });
        }
        Ok(())
    }

    fn write(
        &self,
        addr: ProcessAddress,
        width: usize,
        patch: impl Fn(&mut ProcessData) -> ProcessResult<()>,
    ) -> DriverResult<()> {
        match addr.validate(width)? {
            area @ ProcessArea::Input => Err(DriverError::ReadOnlyArea { area }),
            ProcessArea::Memory => Ok(patch(&mut self.buffers.lock().live)?),
            ProcessArea::Output => self.write_output(addr, width, patch),
        }
    }

    fn write_output(
        &self,
        addr: ProcessAddress,
        width: usize,
        patch: impl Fn(&mut ProcessData) -> ProcessResult<()>,
    ) -> DriverResult<()> {
        let byte = addr.byte_offset();
        let (first, count) = register_span(byte, width);
        self.check_registers(first, count)?;

        // Both fit u16: the register map is at most half an area.
        let start = first as u16;
        let quantity = count as u16;
        let window = 2 * first..2 * (first + count);

        let mut scratch = ProcessData::new();
        {
            let mut link = self.transport.lock();
            let current = link.read("read holding registers", quantity, |t| {
                t.read_holding_registers(start, quantity)
            })?;
            unpack(&current, &mut scratch.area_mut(ProcessArea::Output)[window.clone()]);
            patch(&mut scratch)?;
            let updated = pack(&scratch.area(ProcessArea::Output)[window]);
            if let [single] = updated.as_slice() {
                link.call("write single register", |t| t.write_single_register(start, *single))?;
            } else {
                link.call("write multiple registers", |t| {
                    t.write_multiple_registers(start, &updated)
                })?;
            }
        }

        let written = &scratch.area(ProcessArea::Output)[byte..byte + width];
        let mut buffers = self.buffers.lock();
        buffers.live.area_mut(ProcessArea::Output)[byte..byte + width].copy_from_slice(written);
        buffers.load.area_mut(ProcessArea::Output)[byte..byte + width].copy_from_slice(written);
        buffers.output_writes += 1;
        Ok(())
    }

    fn stage(&self) -> DriverResult<Staged> {
        let output_writes = self.buffers.lock().output_writes;
        let mut image = ProcessData::new();
        let mut link = self.transport.lock();
        for (start, len) in chunks(self.config.register_count, MODBUS_MAX_READ_REGISTERS) {
            let window = 2 * usize::from(start)..2 * usize::from(start + len);

            let inputs = link.read("read input registers", len, |t| {
                t.read_input_registers(start, len)
            })?;
            unpack(&inputs, &mut image.area_mut(ProcessArea::Input)[window.clone()]);

            let holding = link.read("read holding registers", len, |t| {
                t.read_holding_registers(start, len)
            })?;
            unpack(&holding, &mut image.area_mut(ProcessArea::Output)[window]);
        }
        Ok(Staged {
            image,
            output_writes,
        })
    }

    fn commit(&self, staged: &Staged) {
        let mut buffers = self.buffers.lock();
        buffers.load.copy_area_from(&staged.image, ProcessArea::Input);
        if buffers.output_writes == staged.output_writes {
            buffers.load.copy_area_from(&staged.image, ProcessArea::Output);
        } else {
            debug!("OUTPUT written during refresh; keeping the written image");
        }
    }
}

impl DriverBuffer for ModbusDriver {
    fn refresh(&self) -> DriverResult<()> {
        let staged = self.stage()?;
        self.commit(&staged);
        Ok(())
    }
}

impl DriverUpdater for ModbusDriver {
    fn update(&self) -> DriverResult<()> {
        let mut buffers = self.buffers.lock();
        let Buffers { live, load, .. } = &mut *buffers;
        live.copy_area_from(load, ProcessArea::Input);
        live.copy_area_from(load, ProcessArea::Output);
        Ok(())
    }
}

impl ProcessImageReader for ModbusDriver {
    fn read_bit(&self, addr: ProcessAddress) -> DriverResult<bool> {
        Ok(self.buffers.lock().live.get_bit(addr)?)
    }

    fn read_byte(&self, addr: ProcessAddress) -> DriverResult<u8> {
        Ok(self.buffers.lock().live.get_byte(addr)?)
    }

    fn read_word(&self, addr: ProcessAddress) -> DriverResult<u16> {
        Ok(self.buffers.lock().live.get_word(addr)?)
    }

    fn read_dword(&self, addr: ProcessAddress) -> DriverResult<u32> {
        Ok(self.buffers.lock().live.get_dword(addr)?)
    }

    fn read_int(&self, addr: ProcessAddress) -> DriverResult<i32> {
        Ok(self.buffers.lock().live.get_int(addr)?)
    }

    fn read_real(&self, addr: ProcessAddress) -> DriverResult<f32> {
        Ok(self.buffers.lock().live.get_real(addr)?)
    }

    fn read_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<Vec<bool>> {
        Ok(self.buffers.lock().live.get_bits(addrs)?)
    }
}

impl ProcessImageWriter for ModbusDriver {
    fn write_bit(&self, addr: ProcessAddress, value: bool) -> DriverResult<()> {
        self.write(addr, 1, |d| d.write_bit(addr, value))
    }

    fn invert_bit(&self, addr: ProcessAddress) -> DriverResult<()> {
        self.write(addr, 1, |d| d.invert_bit(addr))
    }

    fn write_byte(&self, addr: ProcessAddress, value: u8) -> DriverResult<()> {
        self.write(addr, 1, |d| d.set_byte(addr, value))
    }

    fn write_word(&self, addr: ProcessAddress, value: u16) -> DriverResult<()> {
        self.write(addr, 2, |d| d.set_word(addr, value))
    }

    fn write_dword(&self, addr: ProcessAddress, value: u32) -> DriverResult<()> {
        self.write(addr, 4, |d| d.set_dword(addr, value))
    }

    fn write_int(&self, addr: ProcessAddress, value: i32) -> DriverResult<()> {
        self.write(addr, 4, |d| d.set_int(addr, value))
    }

    fn write_real(&self, addr: ProcessAddress, value: f32) -> DriverResult<()> {
        self.write(addr, 4, |d| d.set_real(addr, value))
    }

    fn set_bits(&self, addrs: &[ProcessAddress]) -> DriverResult<()> {
        for (index, addr) in addrs.iter().enumerate() {
            self.write_bit(*addr, true).map_err(|e| match e {
                DriverError::Process(source) => DriverError::Batch { index, source },
                other => other,
            })?;
        }
        Ok(())
    }
}

impl Driver for ModbusDriver {
    fn name(&self) -> &'static str {
        "modbus"
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
pub(crate) mod tests {
    use super::*;
    use plcio_common::driver::ModbusTransportConfig;
    use plcio_common::process::ProcessError;
    use std::sync::Arc;

    /// In-memory slave shared between a test and its transports.
    #[derive(Default)]
    pub(crate) struct Device {
        pub input: Vec<u16>,
        pub holding: Vec<u16>,
        pub writes: Vec<(u16, Vec<u16>)>,
        pub input_reads: usize,
        pub connects: usize,
        pub fail: bool,
    }

    struct FakeTransport(Arc<Mutex<Device>>);

    fn broken() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "link down")
    }

    impl ModbusTransport for FakeTransport {
        fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
            let mut dev = self.0.lock();
            if dev.fail {
                return Err(broken());
            }
            dev.input_reads += 1;
            let (a, c) = (usize::from(addr), usize::from(count));
            Ok(dev.input[a..a + c].to_vec())
        }

        fn read_holding_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
            let dev = self.0.lock();
            if dev.fail {
                return Err(broken());
            }
            let (a, c) = (usize::from(addr), usize::from(count));
            Ok(dev.holding[a..a + c].to_vec())
        }

        fn write_single_register(&mut self, addr: u16, value: u16) -> io::Result<()> {
            self.write_multiple_registers(addr, &[value])
        }

        fn write_multiple_registers(&mut self, addr: u16, values: &[u16]) -> io::Result<()> {
            let mut dev = self.0.lock();
            if dev.fail {
                return Err(broken());
            }
            let a = usize::from(addr);
            dev.holding[a..a + values.len()].copy_from_slice(values);
            dev.writes.push((addr, values.to_vec()));
            Ok(())
        }
    }

    pub(crate) fn device() -> Arc<Mutex<Device>> {
        Arc::new(Mutex::new(Device {
            input: vec![0; 128],
            holding: vec![0; 128],
            ..Device::default()
        }))
    }

    pub(crate) fn config(register_count: u16) -> ModbusConfig {
        ModbusConfig {
            slave_id: 1,
            register_count,
            polling_interval_ms: 10,
            transport: ModbusTransportConfig::Tcp {
                address: "127.0.0.1".parse().unwrap(),
                port: 502,
            },
        }
    }

    pub(crate) fn fake_driver(device: &Arc<Mutex<Device>>, register_count: u16) -> ModbusDriver {
        let device = Arc::clone(device);
        ModbusDriver::with_connector(
            config(register_count),
            Box::new(move || {
                device.lock().connects += 1;
                Ok(Box::new(FakeTransport(Arc::clone(&device))) as Box<dyn ModbusTransport>)
            }),
        )
    }

    fn output(byte: usize) -> ProcessAddress {
        ProcessAddress::at_byte(ProcessArea::Output, byte)
    }

    #[test]
    fn refresh_is_published_only_by_update() {
        let dev = device();
        dev.lock().input[0] = 0x1234;
        dev.lock().holding[1] = 0xBEEF;
        let driver = fake_driver(&dev, 8);

        driver.refresh().unwrap();
        assert_eq!(driver.read_word(ProcessAddress::at_byte(ProcessArea::Input, 0)).unwrap(), 0);

        driver.update().unwrap();
        assert_eq!(driver.read_byte(ProcessAddress::at_byte(ProcessArea::Input, 0)).unwrap(), 0x34);
        assert_eq!(driver.read_byte(ProcessAddress::at_byte(ProcessArea::Input, 1)).unwrap(), 0x12);
        assert_eq!(driver.read_word(output(2)).unwrap(), 0xBEEF);
    }

    #[test]
    fn refresh_overtaken_by_output_write_keeps_written_value() {
        let dev = device();
        dev.lock().input[0] = 0x0007;
        dev.lock().holding[0] = 0x0011;
        let driver = fake_driver(&dev, 8);

        let staged = driver.stage().unwrap();
        driver.write_byte(output(0), 0x99).unwrap();
        driver.commit(&staged);
        driver.update().unwrap();

        assert_eq!(driver.read_byte(output(0)).unwrap(), 0x99);
        assert_eq!(driver.read_byte(ProcessAddress::at_byte(ProcessArea::Input, 0)).unwrap(), 0x07);

        driver.refresh().unwrap();
        driver.update().unwrap();
        assert_eq!(driver.read_byte(output(0)).unwrap(), 0x99);
        assert_eq!(dev.lock().holding[0], 0x0099);
    }

    #[test]
    fn bytes_beyond_register_map_read_zero() {
        let dev = device();
        dev.lock().input[10] = 0xFFFF;
        let driver = fake_driver(&dev, 4);
        driver.refresh().unwrap();
        driver.update().unwrap();
        assert_eq!(driver.read_word(ProcessAddress::at_byte(ProcessArea::Input, 20)).unwrap(), 0);
    }

    #[test]
    fn odd_offset_write_byte_touches_high_byte_only() {
        let dev = device();
        dev.lock().holding[2] = 0x00AA;
        let driver = fake_driver(&dev, 8);

        driver.write_byte(output(5), 0x55).unwrap();

        let dev = dev.lock();
        assert_eq!(dev.holding[2], 0x55AA);
        assert_eq!(dev.writes, vec![(2, vec![0x55AA])]);
        drop(dev);
        assert_eq!(driver.read_byte(output(5)).unwrap(), 0x55);
        assert_eq!(driver.read_byte(output(4)).unwrap(), 0);
    }

    #[test]
    fn unaligned_word_spans_two_registers() {
        let dev = device();
        dev.lock().holding[1] = 0x0011;
        dev.lock().holding[2] = 0x2200;
        let driver = fake_driver(&dev, 8);

        driver.write_word(output(3), 0xBEEF).unwrap();

        let dev = dev.lock();
        assert_eq!(dev.holding[1], 0xEF11);
        assert_eq!(dev.holding[2], 0x22BE);
        assert_eq!(dev.writes, vec![(1, vec![0xEF11, 0x22BE])]);
    }

    #[test]
    fn output_bits_keep_siblings_on_device() {
        let dev = device();
        dev.lock().holding[0] = 0x0100;
        let driver = fake_driver(&dev, 8);

        driver.set_bit(ProcessAddress::new(ProcessArea::Output, 1, 3)).unwrap();
        assert_eq!(dev.lock().holding[0], 0x0900);

        driver.invert_bit(ProcessAddress::new(ProcessArea::Output, 1, 0)).unwrap();
        assert_eq!(dev.lock().holding[0], 0x0800);
        assert_eq!(driver.read_byte(output(1)).unwrap(), 0x08);
    }

    #[test]
    fn input_is_read_only() {
        let dev = device();
        let driver = fake_driver(&dev, 8);
        let err = driver
            .write_byte(ProcessAddress::at_byte(ProcessArea::Input, 0), 1)
            .unwrap_err();
        assert!(matches!(err, DriverError::ReadOnlyArea { area: ProcessArea::Input }));
        assert_eq!(dev.lock().connects, 0);
    }

    #[test]
    fn writes_beyond_register_map_are_rejected() {
        let dev = device();
        let driver = fake_driver(&dev, 4);
        let err = driver.write_byte(output(8), 1).unwrap_err();
        assert!(matches!(err, DriverError::RegisterOutOfRange { register: 4, count: 4 }));

        let err = driver.write_dword(output(6), 1).unwrap_err();
        assert!(matches!(err, DriverError::RegisterOutOfRange { register: 4, count: 4 }));
        assert!(dev.lock().writes.is_empty());
    }

    #[test]
    fn memory_writes_stay_local() {
        let dev = device();
        let driver = fake_driver(&dev, 8);
        let addr = ProcessAddress::at_byte(ProcessArea::Memory, 0);

        driver.write_int(addr, -5).unwrap();
        driver.refresh().unwrap();
        driver.update().unwrap();

        assert_eq!(driver.read_int(addr).unwrap(), -5);
        assert!(dev.lock().writes.is_empty());
    }

    #[test]
    fn addressing_errors_come_before_transport() {
        let dev = device();
        let driver = fake_driver(&dev, 8);
        let err = driver
            .set_bit(ProcessAddress::new(ProcessArea::Output, 0, 70))
            .unwrap_err();
        assert!(matches!(err, DriverError::Process(ProcessError::BitOutOfRange { bit: 70 })));
        assert_eq!(dev.lock().connects, 0);
    }

    #[test]
    fn set_bits_reports_failing_index() {
        let dev = device();
        let driver = fake_driver(&dev, 8);
        let err = driver
            .set_bits(&[
                ProcessAddress::new(ProcessArea::Memory, 0, 0),
                ProcessAddress::new(ProcessArea::Memory, 0, 9),
            ])
            .unwrap_err();
        assert!(matches!(err, DriverError::Batch { index: 1, .. }));
        assert!(driver.read_bit(ProcessAddress::new(ProcessArea::Memory, 0, 0)).unwrap());
    }

    #[test]
    fn transport_failure_drops_connection_and_reconnects() {
        let dev = device();
        let driver = fake_driver(&dev, 8);
        driver.refresh().unwrap();

        dev.lock().fail = true;
        let err = driver.refresh().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Transport {
                operation: "read input registers",
                ..
            }
        ));

        dev.lock().fail = false;
        driver.refresh().unwrap();
        assert_eq!(dev.lock().connects, 2);
    }

    #[test]
    fn large_maps_are_read_in_chunks() {
        let dev = device();
        dev.lock().input[127] = 0x0102;
        let driver = fake_driver(&dev, 128);
        driver.refresh().unwrap();
        driver.update().unwrap();

        assert_eq!(dev.lock().input_reads, 2);
        assert_eq!(
            driver.read_word(ProcessAddress::at_byte(ProcessArea::Input, 254)).unwrap(),
            0x0102
        );
    }
}
