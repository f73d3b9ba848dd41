//! Runtime error type.

use plcio_common::config::ConfigError;
use plcio_common::driver::{ConnectionId, DriverError};
use plcio_shared_memory::ShmError;
use thiserror::Error;

/// Errors raised while building or running the plcio runtime.
#[derive(Debug, Error)]
pub enum HalError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Hosted region failed
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// A driver could not be opened or failed at runtime
    #[error("connection {id}")]
    Driver {
        /// Connection id
        id: ConnectionId,
        /// Driver failure
        #[source]
        source: DriverError,
    },

    /// Two connections share one id
    #[error("connection {id} is already open")]
    DuplicateConnection {
        /// Connection id
        id: ConnectionId,
    },

    /// No factory is registered for a connection kind
    #[error("no driver registered for kind '{kind}'")]
    DriverNotFound {
        /// Connection kind
        kind: String,
    },

    /// No connection with this id is open
    #[error("connection {id} is not open")]
    UnknownConnection {
        /// Connection id
        id: ConnectionId,
    },

    /// A factory was handed a connection of another kind
    #[error("connection {id}: {factory} factory cannot open kind '{kind}'")]
    KindMismatch {
        /// Connection id
        id: ConnectionId,
        /// Factory kind
        factory: &'static str,
        /// Connection kind
        kind: &'static str,
    },

    /// Runtime used before `init`
    #[error("runtime not initialized")]
    NotInitialized,

    /// Worker thread could not be spawned
    #[error("failed to spawn {thread} thread")]
    Spawn {
        /// Thread name
        thread: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },
}

impl HalError {
    /// Process exit code for this error.
    ///
    /// Fatal region startup errors keep their distinct code; everything else
    /// exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            HalError::Shm(e) => e.exit_code().unwrap_or(1),
            _ => 1,
        }
    }
}
