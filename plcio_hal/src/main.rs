//! # plcio Runtime Binary
//!
//! Hosts a process region and its dispatch loop, opens the configured
//! driver connections and keeps their buffers polled and published.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration file
//! plcio_hal
//!
//! # Explicit configuration, verbose logging
//! plcio_hal --config config/plcio.toml -v
//!
//! # JSON logs
//! plcio_hal --config config/plcio.toml --json
//! ```

#![deny(warnings)]

use clap::Parser;
use plcio_common::config::{LogLevel, PlcioConfig};
use plcio_common::consts::DEFAULT_CONFIG_PATH;
use plcio_hal::{HalError, PlcioCore};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// plcio runtime - process image exchange over shared memory and Modbus
#[derive(Parser, Debug)]
#[command(name = "plcio_hal")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Process image exchange over shared memory and Modbus")]
#[command(long_about = None)]
struct Args {
    /// Path to the runtime configuration file (plcio.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = PlcioCore::load_config(&args.config);
    setup_tracing(&args, log_directive(args.verbose, config.as_ref().ok()));

    if let Err(e) = config.and_then(run) {
        error!("plcio startup failed: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(config: PlcioConfig) -> Result<(), HalError> {
    info!("plcio runtime v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut core = PlcioCore::new(config)?;

    let running = core.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to install signal handler: {}", e);
    }

    core.init()?;

    if let Err(e) = core.run() {
        error!("Runtime loop error: {}", e);
    }

    core.shutdown()?;
    info!("plcio runtime shutdown complete");
    Ok(())
}

/// Default filter directive: `-v` wins, then the configured level.
fn log_directive(verbose: bool, config: Option<&PlcioConfig>) -> &'static str {
    if verbose {
        LogLevel::Debug.as_str()
    } else {
        config.map_or(LogLevel::default(), |c| c.shared.log_level).as_str()
    }
}

/// Setup tracing subscriber; `RUST_LOG` overrides `directive`.
fn setup_tracing(args: &Args, directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
