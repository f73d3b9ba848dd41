//! # plcio Shared Memory Region
//!
//! A named POSIX shared memory segment holding a controller's process image
//! (INPUT, OUTPUT, MEMORY) next to a single-slot request/reply command
//! channel. Every process mapping the segment synchronises through
//! process-shared pthread mutexes and a condition variable stored in the
//! segment itself.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────┐    ┌──────────────────┐
//! │ Client          │    │ /plcio_<name>        │    │ Server           │
//! │                 │    │                      │    │                  │
//! │ RegionClient    ├───►│ request ── record ───┼───►│ CommandDispatcher│
//! │  submit_request │    │ reply   ◄─ condvar   │◄───┤  run_cycle       │
//! │  wait_reply     │    │ process ── image     │    │  execute         │
//! └─────────────────┘    └──────────────────────┘    └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use plcio_shared_memory::{CommandDispatcher, CommandRecord, RegionClient, SharedMemoryRegion};
//! use plcio_common::process::{ProcessAddress, ProcessArea};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Server
//! let mut dispatcher = CommandDispatcher::new(SharedMemoryRegion::create("plc")?);
//!
//! // Client
//! let client = RegionClient::attach("plc")?;
//! client.region().submit_request(&CommandRecord::set_bit(ProcessAddress::new(ProcessArea::Memory, 45, 5))?)?;
//! dispatcher.run_cycle()?;
//! let reply = client.region().poll_reply()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Startup failures map to distinct process exit codes:
//!
//! | Error         | Exit code |
//! |---------------|-----------|
//! | `Open`        | 10        |
//! | `Size`        | 11        |
//! | `Map`         | 12        |
//! | `MutexAttr`   | 13        |
//! | `MutexInit`   | 14        |
//! | `CondvarAttr` | 15        |
//! | `CondvarInit` | 16        |

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod platform;
pub mod region;
pub mod sync;

pub use client::RegionClient;
pub use command::{CommandRecord, NokCode, Opcode, Reply};
pub use dispatch::{CommandDispatcher, CycleOutcome, DispatchStats, Execution, execute};
pub use error::{ShmError, ShmResult};
pub use layout::{REGION_SIZE, SyncFlags};
pub use region::{RegionRole, SharedMemoryRegion};

/// Initialize tracing for plcio processes.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
