//! Shared memory region: lifecycle, request/reply channel, process access.
//!
//! ## Roles
//!
//! | Role   | Entry point | May destroy | Typical holder        |
//! |--------|-------------|-------------|-----------------------|
//! | Server | `create`    | yes         | dispatch loop process |
//! | Client | `attach`    | no          | drivers, tools        |
//!
//! `create` either initialises a new segment or re-attaches to a ready one
//! with the same layout, so a restarted server picks up where it left off.
//! `attach` is idempotent: a crashed client simply attaches again.
//! Dropping a region only unmaps it; the name survives until `destroy`.
//!
//! ## Channel State
//!
//! | Flags              | Meaning                          |
//! |--------------------|----------------------------------|
//! | empty              | idle                             |
//! | `REQUEST`          | request waiting for the server   |
//! | `REPLY`            | reply waiting for the client     |
//! | `REQUEST \| REPLY` | desync; healed by the next poll  |

use crate::command::CommandRecord;
use crate::error::{ShmError, ShmResult};
use crate::layout::{
    INIT_BUSY, INIT_READY, INIT_UNINIT, REGION_MAGIC, REGION_SIZE, RegionLayout, RequestSlot,
    SyncFlags, layout_hash,
};
use crate::platform::{current_pid, open_segment, posix_name, unlink_segment};
use crate::sync::Deadline;
use memmap2::MmapMut;
use plcio_common::process::ProcessData;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REQUEST_LOCK: &str = "request";
const REPLY_LOCK: &str = "reply";
const REPLY_READY: &str = "reply_ready";
const PROCESS_LOCK: &str = "process";

/// How long `create` waits for a concurrent initialiser before taking over.
const INIT_WAIT: Duration = Duration::from_secs(1);

/// Which side of the channel a handle plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRole {
    /// Created the segment; serves requests; may destroy it
    Server,
    /// Attached to an existing segment
    Client,
}

/// A mapped region.
pub struct SharedMemoryRegion {
    name: String,
    role: RegionRole,
    map: MmapMut,
}

impl std::fmt::Debug for SharedMemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemoryRegion")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("len", &self.map.len())
            .finish()
    }
}

impl SharedMemoryRegion {
    /// Create region `name` (POSIX `/plcio_<name>`) in the server role.
    ///
    /// Re-attaches if a ready segment with the same layout already exists.
    ///
    /// # Errors
    ///
    /// Startup failures (`Open`, `Size`, `Map`, mutex and condvar setup)
    /// carry distinct exit codes; `LayoutMismatch` if an existing segment
    /// was built with a different layout.
    pub fn create(name: &str) -> ShmResult<Self> {
        let posix = posix_name(name)?;
        let segment = open_segment(&posix, REGION_SIZE, true)?;
        let region = Self {
            name: posix,
            role: RegionRole::Server,
            map: segment.map,
        };
        region.initialize_or_adopt()?;
        Ok(region)
    }

    /// Attach to region `name` in the client role.
    pub fn attach(name: &str) -> ShmResult<Self> {
        let posix = posix_name(name)?;
        let segment = open_segment(&posix, REGION_SIZE, false)?;
        let region = Self {
            name: posix,
            role: RegionRole::Client,
            map: segment.map,
        };

        if region.layout().header.init_state.load(Ordering::Acquire) != INIT_READY {
            return Err(ShmError::NotInitialized { name: region.name });
        }
        region.check_header()?;
        debug!("Attached to region {}", region.name);
        Ok(region)
    }

    /// Unmap the region.
    pub fn detach(self) {
        debug!("Detached from region {}", self.name);
    }

    /// Unmap and unlink the region. Server role only.
    pub fn destroy(self) -> ShmResult<()> {
        if self.role != RegionRole::Server {
            return Err(ShmError::NotOwner { name: self.name });
        }
        unlink_segment(&self.name)?;
        info!("Destroyed region {}", self.name);
        Ok(())
    }

    /// POSIX segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role of this handle.
    pub fn role(&self) -> RegionRole {
        self.role
    }

    fn layout(&self) -> &RegionLayout {
        // SAFETY: the mapping is REGION_SIZE bytes, page aligned, and lives
        // as long as self. Every mutable field is behind an atomic or a
        // process-shared mutex.
        unsafe { &*(self.map.as_ptr() as *const RegionLayout) }
    }

    fn check_header(&self) -> ShmResult<()> {
        let header = &self.layout().header;
        let magic = header.magic.load(Ordering::Acquire);
        let found = header.layout_hash.load(Ordering::Acquire);
        if magic != REGION_MAGIC || found != layout_hash() {
            return Err(ShmError::LayoutMismatch {
                name: self.name.clone(),
                expected: layout_hash(),
                found,
            });
        }
        Ok(())
    }

    fn initialize_or_adopt(&self) -> ShmResult<()> {
        let header = &self.layout().header;
        let give_up = Instant::now() + INIT_WAIT;
        loop {
            match header.init_state.compare_exchange(
                INIT_UNINIT,
                INIT_BUSY,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return self.initialize(),
                Err(INIT_READY) => {
                    self.check_header()?;
                    header.owner_pid.store(current_pid(), Ordering::Release);
                    info!("Re-attached to existing region {}", self.name);
                    return Ok(());
                }
                Err(_) if Instant::now() >= give_up => {
                    warn!("Region {} stuck initialising; taking over", self.name);
                    return self.initialize();
                }
                Err(_) => std::thread::sleep(Duration::from_millis(1)),
            }
        }
    }

    fn initialize(&self) -> ShmResult<()> {
        let layout = self.layout();
        let header = &layout.header;

        // SAFETY: init_state is INIT_BUSY, so no peer touches the
        // primitives until INIT_READY is published below.
        let result = unsafe {
            layout
                .request
                .init(REQUEST_LOCK)
                .and_then(|()| layout.reply.init(REPLY_LOCK))
                .and_then(|()| layout.reply_ready.init(REPLY_READY))
                .and_then(|()| layout.process.init(PROCESS_LOCK))
        };
        if let Err(e) = result {
            header.init_state.store(INIT_UNINIT, Ordering::Release);
            return Err(e);
        }

        layout.request.lock(REQUEST_LOCK)?.clear();
        header.magic.store(REGION_MAGIC, Ordering::Relaxed);
        header.layout_hash.store(layout_hash(), Ordering::Relaxed);
        header.owner_pid.store(current_pid(), Ordering::Relaxed);
        header.init_state.store(INIT_READY, Ordering::Release);

        info!("Created region {} ({} bytes)", self.name, REGION_SIZE);
        Ok(())
    }

    // ─── Request/Reply Channel ──────────────────────────────────────

    /// Submit a request: write `cmd` and mark the channel `REQUEST`.
    pub fn submit_request(&self, cmd: &CommandRecord) -> ShmResult<()> {
        cmd.check_capacity()?;
        let mut slot = self.layout().request.lock(REQUEST_LOCK)?;
        slot.record = *cmd;
        slot.flags = SyncFlags::REQUEST;
        slot.unlock()
    }

    /// Take a pending request without blocking.
    ///
    /// Returns `None` if the request mutex is busy, nothing is pending, or
    /// the channel was desynchronised (it is reset to idle).
    pub fn poll_request(&self) -> ShmResult<Option<CommandRecord>> {
        let Some(mut slot) = self.layout().request.try_lock(REQUEST_LOCK)? else {
            return Ok(None);
        };
        let taken = self.take(&mut slot, SyncFlags::REQUEST);
        slot.unlock()?;
        Ok(taken)
    }

    /// Submit a reply: write `cmd`, mark the channel `REPLY` and wake waiters.
    ///
    /// If a newer request arrived while the previous one was served, the
    /// channel is left desynchronised and the next poll resets it to idle.
    pub fn submit_reply(&self, cmd: &CommandRecord) -> ShmResult<()> {
        cmd.check_capacity()?;
        let layout = self.layout();
        {
            let mut slot = layout.request.lock(REQUEST_LOCK)?;
            if slot.flags.contains(SyncFlags::REQUEST) {
                warn!(
                    "Reply (opcode {}) overtaken by request (opcode {}) in {}",
                    cmd.opcode, slot.record.opcode, self.name
                );
                slot.flags.insert(SyncFlags::REPLY);
            } else {
                slot.record = *cmd;
                slot.flags = SyncFlags::REPLY;
            }
            slot.unlock()?;
        }
        let guard = layout.reply.lock(REPLY_LOCK)?;
        layout.reply_ready.notify_all(REPLY_READY)?;
        guard.unlock()
    }

    /// Take a pending reply without blocking.
    pub fn poll_reply(&self) -> ShmResult<Option<CommandRecord>> {
        let Some(mut slot) = self.layout().request.try_lock(REQUEST_LOCK)? else {
            return Ok(None);
        };
        let taken = self.take(&mut slot, SyncFlags::REPLY);
        slot.unlock()?;
        Ok(taken)
    }

    /// Wait up to `timeout` for a reply.
    ///
    /// Holds the reply mutex while checking the channel so a reply
    /// submitted in between cannot be missed. Spurious wakeups re-check;
    /// one final poll runs at the deadline.
    pub fn wait_reply(&self, timeout: Duration) -> ShmResult<Option<CommandRecord>> {
        let layout = self.layout();
        let deadline = Deadline::after(timeout)?;

        let mut waiting = layout.reply.lock(REPLY_LOCK)?;
        loop {
            let mut slot = layout.request.lock(REQUEST_LOCK)?;
            let taken = self.take(&mut slot, SyncFlags::REPLY);
            slot.unlock()?;
            if taken.is_some() {
                waiting.unlock()?;
                return Ok(taken);
            }
            if layout.reply_ready.wait_until(&mut waiting, &deadline, REPLY_READY)? {
                break;
            }
        }
        waiting.unlock()?;
        self.poll_reply()
    }

    fn take(&self, slot: &mut RequestSlot, wanted: SyncFlags) -> Option<CommandRecord> {
        if slot.flags == SyncFlags::REQUEST | SyncFlags::REPLY {
            warn!(
                "Desynchronised channel in {} (opcode {}); resetting to idle",
                self.name, slot.record.opcode
            );
            slot.clear();
            return None;
        }
        if slot.flags != wanted {
            return None;
        }
        let record = slot.record;
        if wanted == SyncFlags::REQUEST {
            slot.flags.remove(SyncFlags::REQUEST);
        } else {
            slot.clear();
        }
        Some(record)
    }

    // ─── Process Data ───────────────────────────────────────────────

    /// Run `f` on the process image under the process mutex.
    pub fn access_process_data<R>(&self, f: impl FnOnce(&mut ProcessData) -> R) -> ShmResult<R> {
        let mut data = self.layout().process.lock(PROCESS_LOCK)?;
        let result = f(&mut data);
        data.unlock()?;
        Ok(result)
    }
}
