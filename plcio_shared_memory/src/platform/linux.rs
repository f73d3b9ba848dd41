//! POSIX shared memory objects: `shm_open`, `ftruncate`, `mmap`, `shm_unlink`.

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::{ftruncate, getpid};
use std::fs::File;

/// Prefix of every POSIX segment name.
pub const SEGMENT_PREFIX: &str = "/plcio_";

/// Longest accepted region name.
const MAX_NAME_LEN: usize = 200;

/// A mapped segment.
pub struct MappedSegment {
    /// Mapping of the whole object
    pub map: MmapMut,
    /// True if this call created the object or found it empty
    pub fresh: bool,
}

/// POSIX object name for region `name`.
pub fn posix_name(name: &str) -> ShmResult<String> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') || name.contains('\0') {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(format!("{SEGMENT_PREFIX}{name}"))
}

/// Open (or with `create`, create) `posix` and map `size` bytes of it.
///
/// A new or empty object is sized to `size`. An existing object of any
/// other size is rejected with `LayoutMismatch`.
pub fn open_segment(posix: &str, size: usize, create: bool) -> ShmResult<MappedSegment> {
    let flags = if create {
        OFlag::O_CREAT | OFlag::O_RDWR
    } else {
        OFlag::O_RDWR
    };
    let fd = shm_open(posix, flags, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| match e {
        Errno::ENOENT if !create => ShmError::NotFound {
            name: posix.to_string(),
        },
        source => ShmError::Open {
            name: posix.to_string(),
            source,
        },
    })?;
    let file = File::from(fd);

    let found_len = file.metadata()?.len() as usize;
    let fresh = found_len == 0;
    if fresh {
        if !create {
            return Err(ShmError::NotInitialized {
                name: posix.to_string(),
            });
        }
        ftruncate(&file, size as libc::off_t).map_err(|source| ShmError::Size {
            name: posix.to_string(),
            source,
        })?;
    } else if found_len != size {
        return Err(ShmError::LayoutMismatch {
            name: posix.to_string(),
            expected: size as u64,
            found: found_len as u64,
        });
    }

    // SAFETY: the object is at least `size` bytes long and stays mapped for
    // the lifetime of the MmapMut; concurrent access goes through the
    // process-shared primitives in the mapped layout.
    let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(|source| {
        ShmError::Map {
            name: posix.to_string(),
            source,
        }
    })?;

    Ok(MappedSegment { map, fresh })
}

/// Remove the object name. Existing mappings stay valid.
pub fn unlink_segment(posix: &str) -> ShmResult<()> {
    match shm_unlink(posix) {
        Ok(()) | Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Current process id.
pub fn current_pid() -> u32 {
    getpid().as_raw() as u32
}
