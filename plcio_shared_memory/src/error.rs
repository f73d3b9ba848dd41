//! Error types for shared memory region operations

use crate::command::Reply;
use nix::errno::Errno;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during shared memory region operations
///
/// The startup class (`Open` through `CondvarInit`) is fatal for the
/// process that hits it; each variant maps to a distinct exit code via
/// [`ShmError::exit_code`].
#[derive(Error, Debug)]
pub enum ShmError {
    /// `shm_open` failed
    #[error("Failed to open segment {name}: {source}")]
    Open {
        /// POSIX segment name
        name: String,
        /// Source errno
        #[source]
        source: Errno,
    },

    /// `ftruncate` failed
    #[error("Failed to size segment {name}: {source}")]
    Size {
        /// POSIX segment name
        name: String,
        /// Source errno
        #[source]
        source: Errno,
    },

    /// `mmap` failed
    #[error("Failed to map segment {name}: {source}")]
    Map {
        /// POSIX segment name
        name: String,
        /// Source IO error
        #[source]
        source: std::io::Error,
    },

    /// Mutex attribute setup failed
    #[error("Failed to set up {primitive} mutex attributes: {errno}")]
    MutexAttr {
        /// Mutex name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Mutex initialization failed
    #[error("Failed to initialize {primitive} mutex: {errno}")]
    MutexInit {
        /// Mutex name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Condition variable attribute setup failed
    #[error("Failed to set up {primitive} condvar attributes: {errno}")]
    CondvarAttr {
        /// Condition variable name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Condition variable initialization failed
    #[error("Failed to initialize {primitive} condvar: {errno}")]
    CondvarInit {
        /// Condition variable name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Locking a region mutex failed
    #[error("Failed to lock {primitive}: {errno}")]
    Lock {
        /// Mutex name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Unlocking a region mutex failed
    #[error("Failed to unlock {primitive}: {errno}")]
    Unlock {
        /// Mutex name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Waiting on or signalling a condition variable failed
    #[error("Condition variable {primitive} failed: {errno}")]
    Condvar {
        /// Condition variable name
        primitive: &'static str,
        /// Returned error number
        errno: Errno,
    },

    /// Record payload length does not fit the command capacity
    #[error("Command length {length} exceeds capacity {capacity}")]
    DataTooLarge {
        /// Declared payload length
        length: usize,
        /// Payload capacity
        capacity: usize,
    },

    /// Address cannot be encoded into a command payload
    #[error("Address {address} cannot be encoded in a command")]
    Unencodable {
        /// Rendered address
        address: String,
    },

    /// Segment name is empty or contains '/'
    #[error("Invalid segment name: {name:?}")]
    InvalidName {
        /// Rejected name
        name: String,
    },

    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// POSIX segment name
        name: String,
    },

    /// Segment exists but its server never finished initialization
    #[error("Segment not initialized: {name}")]
    NotInitialized {
        /// POSIX segment name
        name: String,
    },

    /// Segment was created with a different layout
    #[error("Layout mismatch for {name}: expected {expected:#x}, found {found:#x}")]
    LayoutMismatch {
        /// POSIX segment name
        name: String,
        /// Layout hash of this build
        expected: u64,
        /// Layout hash found in the segment
        found: u64,
    },

    /// Destroy requested by a client
    #[error("Segment {name} is not owned by this handle")]
    NotOwner {
        /// POSIX segment name
        name: String,
    },

    /// No reply arrived in time
    #[error("No reply within {timeout:?}")]
    ReplyTimeout {
        /// Time waited
        timeout: Duration,
    },

    /// Reply did not match the request
    #[error("Unexpected reply: {reply:?}")]
    UnexpectedReply {
        /// Decoded reply
        reply: Reply,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: Errno,
    },
}

impl ShmError {
    /// Process exit code for fatal startup errors, `None` otherwise.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            ShmError::Open { .. } => Some(10),
            ShmError::Size { .. } => Some(11),
            ShmError::Map { .. } => Some(12),
            ShmError::MutexAttr { .. } => Some(13),
            ShmError::MutexInit { .. } => Some(14),
            ShmError::CondvarAttr { .. } => Some(15),
            ShmError::CondvarInit { .. } => Some(16),
            _ => None,
        }
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_have_distinct_exit_codes() {
        let name = || "/plcio_x".to_string();
        let errors = [
            ShmError::Open { name: name(), source: Errno::EACCES },
            ShmError::Size { name: name(), source: Errno::EINVAL },
            ShmError::Map { name: name(), source: std::io::Error::from(std::io::ErrorKind::OutOfMemory) },
            ShmError::MutexAttr { primitive: "request", errno: Errno::EINVAL },
            ShmError::MutexInit { primitive: "request", errno: Errno::EAGAIN },
            ShmError::CondvarAttr { primitive: "reply", errno: Errno::EINVAL },
            ShmError::CondvarInit { primitive: "reply", errno: Errno::ENOMEM },
        ];
        let codes: Vec<i32> = errors.iter().filter_map(ShmError::exit_code).collect();
        assert_eq!(codes, vec![10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn runtime_errors_are_not_fatal() {
        let err = ShmError::Lock { primitive: "process", errno: Errno::EDEADLK };
        assert!(err.exit_code().is_none());
        assert!(err.to_string().contains("process"));
        assert!(ShmError::NotOwner { name: "/plcio_x".into() }.exit_code().is_none());
    }
}
