//! Bit-exact segment layout.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ RegionHeader                 │ magic, layout hash, init state, owner pid
//! ├──────────────────────────────┤
//! │ ShmMutex<RequestSlot>        │ request mutex + sync flags + record
//! │ ShmMutex<()>                 │ reply mutex
//! │ ShmCondvar                   │ reply condvar
//! ├──────────────────────────────┤
//! │ ShmMutex<ProcessData>        │ process mutex + INPUT/OUTPUT/MEMORY
//! └──────────────────────────────┘
//! ```
//!
//! A freshly truncated segment is all zeroes, which is a valid (idle)
//! value for every field; the server then initialises the primitives.

use crate::command::CommandRecord;
use crate::sync::{ShmCondvar, ShmMutex};
use bitflags::bitflags;
use plcio_common::process::ProcessData;
use static_assertions::{const_assert, const_assert_eq};
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Segment magic: "PLCIO\0\0\x01".
pub const REGION_MAGIC: u64 = 0x0100_004F_4943_4C50;

/// Init state: segment freshly created, primitives not initialised.
pub const INIT_UNINIT: u32 = 0;
/// Init state: a server is initialising the primitives.
pub const INIT_BUSY: u32 = 1;
/// Init state: primitives initialised, segment usable.
pub const INIT_READY: u32 = 2;

bitflags! {
    /// Request/reply channel state. `REQUEST | REPLY` is the desync state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct SyncFlags: u32 {
        /// A request is pending for the server
        const REQUEST = 1 << 0;
        /// A reply is pending for the client
        const REPLY = 1 << 1;
    }
}

/// Region header.
#[repr(C)]
pub struct RegionHeader {
    /// Must equal [`REGION_MAGIC`] once ready
    pub magic: AtomicU64,
    /// Must equal [`layout_hash`] once ready
    pub layout_hash: AtomicU64,
    /// `INIT_UNINIT`, `INIT_BUSY` or `INIT_READY`
    pub init_state: AtomicU32,
    /// Pid of the server that last initialised or re-attached
    pub owner_pid: AtomicU32,
}

/// Request/reply slot guarded by the request mutex.
#[repr(C)]
pub struct RequestSlot {
    /// Channel state
    pub flags: SyncFlags,
    /// Current request or reply
    pub record: CommandRecord,
}

impl RequestSlot {
    /// Reset to idle: no flags, empty record.
    pub fn clear(&mut self) {
        self.flags = SyncFlags::empty();
        self.record = CommandRecord::empty();
    }
}

/// Full region layout.
#[repr(C)]
pub struct RegionLayout {
    /// Header
    pub header: RegionHeader,
    /// Request mutex and slot
    pub request: ShmMutex<RequestSlot>,
    /// Reply mutex, paired with `reply_ready`
    pub reply: ShmMutex<()>,
    /// Signalled after each submitted reply
    pub reply_ready: ShmCondvar,
    /// Process mutex and process image
    pub process: ShmMutex<ProcessData>,
}

/// Mapped size of a region.
pub const REGION_SIZE: usize = core::mem::size_of::<RegionLayout>();

const_assert_eq!(core::mem::size_of::<SyncFlags>(), 4);
const_assert_eq!(core::mem::size_of::<RegionHeader>(), 24);
const_assert_eq!(core::mem::size_of::<RequestSlot>(), 4 + core::mem::size_of::<CommandRecord>());
const_assert!(core::mem::align_of::<RegionLayout>() <= 4096);
const_assert!(REGION_SIZE < 4 * 4096);

const fn mix(hash: u64, size: usize, align: usize) -> u64 {
    (hash.rotate_left(5) ^ (size as u64).wrapping_mul(0x9E37_79B9)) ^ (align as u64).wrapping_mul(0x517C_C1B7)
}

/// Hash over the sizes and alignments of every layout component.
///
/// Two builds agree on the hash only if every field sits at the same place.
pub const fn layout_hash() -> u64 {
    use core::mem::{align_of, size_of};
    let mut h = 0xCBF2_9CE4_8422_2325;
    h = mix(h, size_of::<RegionHeader>(), align_of::<RegionHeader>());
    h = mix(h, size_of::<ShmMutex<RequestSlot>>(), align_of::<ShmMutex<RequestSlot>>());
    h = mix(h, size_of::<ShmMutex<()>>(), align_of::<ShmMutex<()>>());
    h = mix(h, size_of::<ShmCondvar>(), align_of::<ShmCondvar>());
    h = mix(h, size_of::<ShmMutex<ProcessData>>(), align_of::<ShmMutex<ProcessData>>());
    mix(h, REGION_SIZE, align_of::<RegionLayout>())
}
