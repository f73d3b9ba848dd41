//! Wire seam for the Modbus driver.
//!
//! The driver talks to a `ModbusTransport`; the production implementation
//! is the blocking `tokio_modbus` client context, connected over TCP or
//! serial RTU from the connection settings.

use plcio_common::driver::{ModbusConfig, ModbusTransportConfig, Parity as ConfigParity};
use std::io;
use tokio_modbus::client::sync::{self, Reader, Writer};
use tokio_modbus::slave::Slave;
use tokio_serial::{DataBits, Parity, StopBits};

/// Register-level Modbus master operations.
pub trait ModbusTransport: Send {
    /// Read `count` input registers starting at `addr`.
    fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>>;

    /// Read `count` holding registers starting at `addr`.
    fn read_holding_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>>;

    /// Write one holding register.
    fn write_single_register(&mut self, addr: u16, value: u16) -> io::Result<()>;

    /// Write consecutive holding registers starting at `addr`.
    fn write_multiple_registers(&mut self, addr: u16, values: &[u16]) -> io::Result<()>;
}

impl ModbusTransport for sync::Context {
    fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
        Reader::read_input_registers(self, addr, count)
    }

    fn read_holding_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
        Reader::read_holding_registers(self, addr, count)
    }

    fn write_single_register(&mut self, addr: u16, value: u16) -> io::Result<()> {
        Writer::write_single_register(self, addr, value)
    }

    fn write_multiple_registers(&mut self, addr: u16, values: &[u16]) -> io::Result<()> {
        Writer::write_multiple_registers(self, addr, values)
    }
}

/// Opens a fresh transport. Called on first use and after every failure.
pub type Connector = Box<dyn Fn() -> io::Result<Box<dyn ModbusTransport>> + Send + Sync>;

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

fn parity(parity: ConfigParity) -> Parity {
    match parity {
        ConfigParity::None => Parity::None,
        ConfigParity::Even => Parity::Even,
        ConfigParity::Odd => Parity::Odd,
    }
}

/// Connector for the configured TCP or RTU link.
pub fn connector(config: &ModbusConfig) -> Connector {
    let slave = Slave(config.slave_id);
    match &config.transport {
        ModbusTransportConfig::Tcp { address, port } => {
            let socket = std::net::SocketAddr::new(*address, *port);
            Box::new(move || {
                let ctx = sync::tcp::connect_slave(socket, slave)?;
                Ok(Box::new(ctx) as Box<dyn ModbusTransport>)
            })
        }
        ModbusTransportConfig::Rtu {
            port,
            baud_rate,
            parity: port_parity,
            data_bits: bits,
            stop_bits: stops,
        } => {
            let builder = tokio_serial::new(port.as_str(), *baud_rate)
                .parity(parity(*port_parity))
                .data_bits(data_bits(*bits))
                .stop_bits(stop_bits(*stops));
            Box::new(move || {
                let ctx = sync::rtu::connect_slave(&builder, slave)?;
                Ok(Box::new(ctx) as Box<dyn ModbusTransport>)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_settings_map_to_port_builder() {
        assert_eq!(data_bits(7), DataBits::Seven);
        assert_eq!(data_bits(8), DataBits::Eight);
        assert_eq!(stop_bits(2), StopBits::Two);
        assert_eq!(parity(ConfigParity::Even), Parity::Even);
    }

    #[test]
    fn tcp_connector_reports_refused_connection() {
        let config = ModbusConfig {
            slave_id: 1,
            register_count: 8,
            polling_interval_ms: 100,
            transport: ModbusTransportConfig::Tcp {
                address: "127.0.0.1".parse().unwrap(),
                port: 1,
            },
        };
        assert!(connector(&config)().is_err());
    }
}
