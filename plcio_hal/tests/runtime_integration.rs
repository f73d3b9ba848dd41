//! Runtime integration tests.
//!
//! A hosted region served by the dispatch loop, reached both through the
//! aggregation layer and through the command channel of a second client.

use plcio_common::config::ConfigError;
use plcio_common::driver::Tag;
use plcio_common::process::{ProcessAddress, ProcessArea, ValueType};
use plcio_hal::{HalError, PlcioCore};
use plcio_shared_memory::{CommandRecord, RegionClient, Reply};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn server_config(segment: &str) -> String {
    format!(
        r#"
[shared]
log_level = "debug"
service_name = "plcio-test"

[server]
segment = "{segment}"
cycle_time_us = 500

[[connections]]
id = 1
kind = "shm"
segment = "{segment}"

[[updaters]]
connection = 1
interval_ms = 5
"#
    )
}

#[test]
fn hosted_region_serves_tags_and_commands() {
    let segment = format!("it_runtime_{}", std::process::id());
    let file = write_config(&server_config(&segment));

    let mut core = PlcioCore::new(PlcioCore::load_config(file.path()).unwrap()).unwrap();
    core.init().unwrap();
    let reader = core.reader().unwrap();
    let writer = core.writer().unwrap();

    let runtime = thread::spawn(move || {
        core.run().unwrap();
        core.shutdown().unwrap();
    });

    let flag = Tag::bit(1, ProcessArea::Memory, 45, 5);
    writer.set_bit(&flag).unwrap();

    let client = RegionClient::attach(&segment)
        .unwrap()
        .with_timeout(Duration::from_secs(1));
    let cmd = CommandRecord::write_word(ProcessAddress::at_byte(ProcessArea::Output, 0), 0x1234).unwrap();
    assert_eq!(client.request(&cmd).unwrap(), Reply::Ok);

    let word = Tag::at(1, ProcessArea::Output, 0, ValueType::Word);
    assert_eq!(reader.read_word(&word).unwrap(), 0x1234);

    let seen = client
        .region()
        .access_process_data(|d| d.get_bit(ProcessAddress::new(ProcessArea::Memory, 45, 5)))
        .unwrap()
        .unwrap();
    assert!(seen);

    assert_eq!(client.exit().unwrap(), Reply::Exit);
    runtime.join().unwrap();
}

#[test]
fn unreachable_modbus_slave_does_not_stop_runtime() {
    let file = write_config(
        r#"
[shared]
service_name = "plcio-modbus"

[[connections]]
id = 2
kind = "modbus"
slave_id = 1
register_count = 8
polling_interval_ms = 5
[connections.transport]
mode = "tcp"
address = "127.0.0.1"
port = 1

[[updaters]]
connection = 2
interval_ms = 5
"#,
    );

    let mut core = PlcioCore::new(PlcioCore::load_config(file.path()).unwrap()).unwrap();
    core.init().unwrap();
    let reader = core.reader().unwrap();
    let running = core.running_flag();

    let runtime = thread::spawn(move || {
        core.run().unwrap();
        core.shutdown().unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    let tag = Tag::at(2, ProcessArea::Input, 0, ValueType::Word);
    assert_eq!(reader.read_word(&tag).unwrap(), 0);

    running.store(false, Ordering::SeqCst);
    runtime.join().unwrap();
}

#[test]
fn missing_config_file_is_reported() {
    let err = PlcioCore::load_config(Path::new("/nonexistent/plcio.toml")).err().unwrap();
    assert!(matches!(err, HalError::Config(ConfigError::FileNotFound)));
    assert_eq!(err.exit_code(), 1);
}
