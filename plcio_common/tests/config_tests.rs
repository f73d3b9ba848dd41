//! Runtime configuration file loading.
//!
//! Loads complete `plcio.toml` files through `ConfigLoader` and checks
//! parsing, defaults and cross-section validation.

use plcio_common::config::{ConfigError, ConfigLoader, LogLevel, PlcioConfig};
use plcio_common::driver::{ConnectionKind, ModbusTransportConfig, Parity};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL: &str = r#"
[shared]
log_level = "debug"
service_name = "plcio-01"

[server]
segment = "plc"
cycle_time_us = 500

[[connections]]
id = 1
kind = "shm"
segment = "plc"

[[connections]]
id = 2
kind = "modbus"
slave_id = 1
register_count = 64
polling_interval_ms = 100

[connections.transport]
mode = "tcp"
address = "127.0.0.1"
port = 1502

[[connections]]
id = 3
kind = "modbus"
slave_id = 4
register_count = 16

[connections.transport]
mode = "rtu"
port = "/dev/ttyUSB0"
baud_rate = 38400
parity = "odd"
stop_bits = 2

[[updaters]]
connection = 2
interval_ms = 100

[[updaters]]
connection = 3
interval_ms = 50
"#;

#[test]
fn loads_full_runtime_config() {
    let file = write_config(FULL);
    let config = PlcioConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "plcio-01");
    assert_eq!(config.server.as_ref().unwrap().cycle_time_us, 500);
    assert_eq!(config.connections.len(), 3);
    assert_eq!(config.updaters.len(), 2);

    let ConnectionKind::Modbus(tcp) = &config.connections[1].kind else {
        panic!("connection 2 should be modbus");
    };
    assert_eq!(
        tcp.transport.socket_addr(),
        Some("127.0.0.1:1502".parse().unwrap())
    );

    let ConnectionKind::Modbus(rtu) = &config.connections[2].kind else {
        panic!("connection 3 should be modbus");
    };
    assert_eq!(
        rtu.transport,
        ModbusTransportConfig::Rtu {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            parity: Parity::Odd,
            data_bits: 8,
            stop_bits: 2,
        }
    );
}

#[test]
fn client_only_config_has_no_server() {
    let file = write_config(
        r#"
[shared]
service_name = "hmi"

[[connections]]
id = 1
kind = "shm"
segment = "plc"
"#,
    );
    let config = PlcioConfig::load(file.path()).unwrap();
    assert!(config.server.is_none());
    assert!(config.updaters.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_kind_is_parse_error() {
    let file = write_config(
        r#"
[shared]
service_name = "x"

[[connections]]
id = 1
kind = "profinet"
"#,
    );
    assert!(matches!(
        PlcioConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn register_count_above_area_is_rejected() {
    let file = write_config(
        r#"
[shared]
service_name = "x"

[[connections]]
id = 1
kind = "modbus"
slave_id = 1
register_count = 200

[connections.transport]
mode = "tcp"
address = "127.0.0.1"
"#,
    );
    let config = PlcioConfig::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("register_count 200"));
}

#[test]
fn updater_for_missing_connection_is_rejected() {
    let file = write_config(
        r#"
[shared]
service_name = "x"

[[updaters]]
connection = 7
interval_ms = 10
"#,
    );
    let config = PlcioConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
