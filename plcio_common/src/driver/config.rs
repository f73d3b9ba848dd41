//! Driver connection configuration.
//!
//! One `[[connections]]` table per driver:
//!
//! ```toml
//! [[connections]]
//! id = 1
//! kind = "shm"
//! segment = "plc"
//!
//! [[connections]]
//! id = 2
//! kind = "modbus"
//! slave_id = 1
//! register_count = 64
//! [connections.transport]
//! mode = "tcp"
//! address = "127.0.0.1"
//! ```

use crate::config::ConfigError;
use crate::consts::{DEFAULT_POLL_INTERVAL_MS, MODBUS_MAX_REGISTER_COUNT, MODBUS_TCP_PORT};
use crate::driver::api::ConnectionId;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_tcp_port() -> u16 {
    MODBUS_TCP_PORT
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// One configured driver connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConnection {
    /// Connection identifier referenced by tags and updaters.
    pub id: ConnectionId,

    /// Driver kind and its settings.
    #[serde(flatten)]
    pub kind: ConnectionKind,
}

/// Driver kind selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Client of a shared memory region.
    Shm {
        /// Region name (mapped to `/plcio_<segment>`).
        segment: String,
    },
    /// Modbus master.
    Modbus(ModbusConfig),
}

impl ConnectionKind {
    /// Name used in the `kind` field.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Shm { .. } => "shm",
            Self::Modbus(_) => "modbus",
        }
    }
}

/// Modbus master settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Slave (unit) identifier.
    pub slave_id: u8,

    /// Number of input and holding registers mapped into the process image.
    pub register_count: u16,

    /// Interval between buffer refreshes.
    #[serde(default = "default_poll_interval_ms")]
    pub polling_interval_ms: u64,

    /// Wire transport.
    pub transport: ModbusTransportConfig,
}

impl ModbusConfig {
    /// Polling interval as Duration.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Modbus wire transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ModbusTransportConfig {
    /// Modbus TCP.
    Tcp {
        /// Slave IP address
        address: IpAddr,
        /// Slave TCP port
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// Modbus RTU over a serial line.
    Rtu {
        /// Serial device path (e.g. "/dev/ttyUSB0")
        port: String,
        /// Line speed
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Parity
        #[serde(default)]
        parity: Parity,
        /// Data bits (5-8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Stop bits (1-2)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

impl ModbusTransportConfig {
    /// Socket address for TCP transports.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp { address, port } => Some(SocketAddr::new(*address, *port)),
            Self::Rtu { .. } => None,
        }
    }

    fn validate(&self, id: ConnectionId) -> Result<(), ConfigError> {
        match self {
            Self::Tcp { port, .. } if *port == 0 => Err(ConfigError::ValidationError(format!(
                "Connection {id}: tcp port must be non-zero"
            ))),
            Self::Tcp { .. } => Ok(()),
            Self::Rtu {
                port,
                baud_rate,
                data_bits,
                stop_bits,
                ..
            } => {
                if port.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: serial port cannot be empty"
                    )));
                }
                if *baud_rate == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: baud_rate must be greater than 0"
                    )));
                }
                if !(5..=8).contains(data_bits) {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: data_bits {data_bits} not in 5-8"
                    )));
                }
                if !(1..=2).contains(stop_bits) {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: stop_bits {stop_bits} not in 1-2"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl DriverConnection {
    /// Validate one connection in isolation.
    ///
    /// # Validation Rules
    /// 1. shm: `segment` is non-empty
    /// 2. modbus: `1 <= register_count <= MODBUS_MAX_REGISTER_COUNT`
    /// 3. modbus: `polling_interval_ms` > 0
    /// 4. modbus: transport settings in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id;
        match &self.kind {
            ConnectionKind::Shm { segment } => {
                if segment.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: segment cannot be empty"
                    )));
                }
                Ok(())
            }
            ConnectionKind::Modbus(modbus) => {
                if modbus.register_count == 0 || modbus.register_count > MODBUS_MAX_REGISTER_COUNT {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: register_count {} not in 1-{}",
                        modbus.register_count, MODBUS_MAX_REGISTER_COUNT
                    )));
                }
                if modbus.polling_interval_ms == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "Connection {id}: polling_interval_ms must be greater than 0"
                    )));
                }
                modbus.transport.validate(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        connections: Vec<DriverConnection>,
    }

    fn parse(text: &str) -> Vec<DriverConnection> {
        toml::from_str::<Wrapper>(text).unwrap().connections
    }

    #[test]
    fn parses_shm_connection() {
        let conns = parse(
            r#"
[[connections]]
id = 1
kind = "shm"
segment = "plc"
"#,
        );
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].id, 1);
        assert_eq!(
            conns[0].kind,
            ConnectionKind::Shm {
                segment: "plc".to_string()
            }
        );
        assert!(conns[0].validate().is_ok());
    }

    #[test]
    fn parses_modbus_tcp_with_defaults() {
        let conns = parse(
            r#"
[[connections]]
id = 2
kind = "modbus"
slave_id = 17
register_count = 64

[connections.transport]
mode = "tcp"
address = "10.0.0.5"
"#,
        );
        let ConnectionKind::Modbus(modbus) = &conns[0].kind else {
            panic!("expected modbus connection");
        };
        assert_eq!(modbus.slave_id, 17);
        assert_eq!(modbus.polling_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(
            modbus.transport.socket_addr(),
            Some("10.0.0.5:502".parse().unwrap())
        );
    }

    #[test]
    fn parses_modbus_rtu() {
        let conns = parse(
            r#"
[[connections]]
id = 3
kind = "modbus"
slave_id = 1
register_count = 8
polling_interval_ms = 250

[connections.transport]
mode = "rtu"
port = "/dev/ttyUSB0"
baud_rate = 19200
parity = "even"
"#,
        );
        let ConnectionKind::Modbus(modbus) = &conns[0].kind else {
            panic!("expected modbus connection");
        };
        assert_eq!(modbus.polling_interval(), Duration::from_millis(250));
        assert_eq!(
            modbus.transport,
            ModbusTransportConfig::Rtu {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 19200,
                parity: Parity::Even,
                data_bits: 8,
                stop_bits: 1,
            }
        );
        assert!(modbus.transport.socket_addr().is_none());
        assert!(conns[0].validate().is_ok());
    }

    #[test]
    fn rejects_bad_register_count() {
        for count in [0, MODBUS_MAX_REGISTER_COUNT + 1] {
            let conn = DriverConnection {
                id: 4,
                kind: ConnectionKind::Modbus(ModbusConfig {
                    slave_id: 1,
                    register_count: count,
                    polling_interval_ms: 100,
                    transport: ModbusTransportConfig::Tcp {
                        address: "127.0.0.1".parse().unwrap(),
                        port: 502,
                    },
                }),
            };
            assert!(matches!(conn.validate(), Err(ConfigError::ValidationError(_))));
        }
    }

    #[test]
    fn rejects_empty_segment_and_bad_serial() {
        let shm = DriverConnection {
            id: 5,
            kind: ConnectionKind::Shm {
                segment: String::new(),
            },
        };
        assert!(shm.validate().is_err());

        let rtu = ModbusTransportConfig::Rtu {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            parity: Parity::None,
            data_bits: 9,
            stop_bits: 1,
        };
        assert!(rtu.validate(6).is_err());
    }
}
