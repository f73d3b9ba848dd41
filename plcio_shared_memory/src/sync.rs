//! Cross-process mutex and condition variable.
//!
//! `ShmMutex<T>` and `ShmCondvar` live inside the mapped segment and wrap
//! `pthread_mutex_t` / `pthread_cond_t` initialised `PTHREAD_PROCESS_SHARED`.
//! They are not interchangeable with in-process locks: the primitive state is
//! shared by every process mapping the segment.
//!
//! On Linux the mutexes are robust. If a peer dies holding one, the next
//! locker receives `EOWNERDEAD`, marks the mutex consistent and proceeds;
//! the protected data is whatever the dead peer left behind.

use crate::error::{ShmError, ShmResult};
use nix::errno::Errno;
use nix::time::{ClockId, clock_gettime};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{error, warn};

/// Absolute `CLOCK_MONOTONIC` deadline for condvar waits.
#[derive(Clone, Copy)]
pub struct Deadline(libc::timespec);

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> ShmResult<Self> {
        let now = clock_gettime(ClockId::CLOCK_MONOTONIC)?;
        let at = now + nix::sys::time::TimeSpec::from(timeout);
        Ok(Self(*at.as_ref()))
    }
}

/// Process-shared mutex protecting a `T` stored next to it.
#[repr(C)]
pub struct ShmMutex<T> {
    raw: UnsafeCell<libc::pthread_mutex_t>,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by the pthread mutex.
unsafe impl<T: Send> Send for ShmMutex<T> {}
unsafe impl<T: Send> Sync for ShmMutex<T> {}

impl<T> ShmMutex<T> {
    /// Initialise the mutex in place.
    ///
    /// # Safety
    ///
    /// No process may be using the mutex. Re-initialising a mutex that is
    /// locked or waited on is undefined behaviour.
    pub unsafe fn init(&self, primitive: &'static str) -> ShmResult<()> {
        let mut attr = std::mem::MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        let attr_err = |rc| ShmError::MutexAttr {
            primitive,
            errno: Errno::from_raw(rc),
        };

        // SAFETY: attr is initialised by pthread_mutexattr_init before use
        // and destroyed on every path after it.
        unsafe {
            let rc = libc::pthread_mutexattr_init(attr.as_mut_ptr());
            if rc != 0 {
                return Err(attr_err(rc));
            }
            let attr_ptr = attr.as_mut_ptr();

            let mut rc = libc::pthread_mutexattr_setpshared(attr_ptr, libc::PTHREAD_PROCESS_SHARED);
            #[cfg(target_os = "linux")]
            if rc == 0 {
                rc = libc::pthread_mutexattr_setrobust(attr_ptr, libc::PTHREAD_MUTEX_ROBUST);
            }
            if rc != 0 {
                libc::pthread_mutexattr_destroy(attr_ptr);
                return Err(attr_err(rc));
            }

            let rc = libc::pthread_mutex_init(self.raw.get(), attr_ptr);
            libc::pthread_mutexattr_destroy(attr_ptr);
            if rc != 0 {
                return Err(ShmError::MutexInit {
                    primitive,
                    errno: Errno::from_raw(rc),
                });
            }
        }
        Ok(())
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self, primitive: &'static str) -> ShmResult<ShmMutexGuard<'_, T>> {
        // SAFETY: raw was initialised by the region server before the
        // segment was marked ready.
        let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        self.acquired(rc, primitive)?;
        Ok(ShmMutexGuard::new(self, primitive))
    }

    /// Acquire the mutex if it is free; `None` if another holder has it.
    pub fn try_lock(&self, primitive: &'static str) -> ShmResult<Option<ShmMutexGuard<'_, T>>> {
        // SAFETY: see `lock`.
        let rc = unsafe { libc::pthread_mutex_trylock(self.raw.get()) };
        if rc == libc::EBUSY {
            return Ok(None);
        }
        self.acquired(rc, primitive)?;
        Ok(Some(ShmMutexGuard::new(self, primitive)))
    }

    fn acquired(&self, rc: i32, primitive: &'static str) -> ShmResult<()> {
        match rc {
            0 => Ok(()),
            #[cfg(target_os = "linux")]
            libc::EOWNERDEAD => {
                self.recover(primitive);
                Ok(())
            }
            rc => Err(ShmError::Lock {
                primitive,
                errno: Errno::from_raw(rc),
            }),
        }
    }

    #[cfg(target_os = "linux")]
    fn recover(&self, primitive: &'static str) {
        warn!("Previous holder of {} died; recovering mutex", primitive);
        // SAFETY: called while holding the mutex after EOWNERDEAD.
        let rc = unsafe { libc::pthread_mutex_consistent(self.raw.get()) };
        if rc != 0 {
            error!("pthread_mutex_consistent({}) failed: {}", primitive, Errno::from_raw(rc));
        }
    }

    fn unlock_raw(&self, primitive: &'static str) -> ShmResult<()> {
        // SAFETY: only called by the guard that holds the lock.
        let rc = unsafe { libc::pthread_mutex_unlock(self.raw.get()) };
        if rc != 0 {
            return Err(ShmError::Unlock {
                primitive,
                errno: Errno::from_raw(rc),
            });
        }
        Ok(())
    }
}

/// Holds an `ShmMutex` locked. Unlocks on drop.
///
/// Not `Send`: a pthread mutex must be unlocked by the locking thread.
pub struct ShmMutexGuard<'a, T> {
    mutex: &'a ShmMutex<T>,
    primitive: &'static str,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> ShmMutexGuard<'a, T> {
    fn new(mutex: &'a ShmMutex<T>, primitive: &'static str) -> Self {
        Self {
            mutex,
            primitive,
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Unlock now, reporting any unlock failure.
    pub fn unlock(mut self) -> ShmResult<()> {
        self.released = true;
        self.mutex.unlock_raw(self.primitive)
    }
}

impl<T> Deref for ShmMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the mutex.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for ShmMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the mutex.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for ShmMutexGuard<'_, T> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.mutex.unlock_raw(self.primitive) {
                error!("{}", e);
            }
        }
    }
}

/// Process-shared condition variable on `CLOCK_MONOTONIC`.
#[repr(C)]
pub struct ShmCondvar {
    raw: UnsafeCell<libc::pthread_cond_t>,
}

// SAFETY: pthread condition variables are thread-safe.
unsafe impl Send for ShmCondvar {}
unsafe impl Sync for ShmCondvar {}

impl ShmCondvar {
    /// Initialise the condition variable in place.
    ///
    /// # Safety
    ///
    /// No process may be waiting on or signalling the condition variable.
    pub unsafe fn init(&self, primitive: &'static str) -> ShmResult<()> {
        let mut attr = std::mem::MaybeUninit::<libc::pthread_condattr_t>::uninit();
        let attr_err = |rc| ShmError::CondvarAttr {
            primitive,
            errno: Errno::from_raw(rc),
        };

        // SAFETY: attr is initialised before use and destroyed after it.
        unsafe {
            let rc = libc::pthread_condattr_init(attr.as_mut_ptr());
            if rc != 0 {
                return Err(attr_err(rc));
            }
            let attr_ptr = attr.as_mut_ptr();

            let mut rc = libc::pthread_condattr_setpshared(attr_ptr, libc::PTHREAD_PROCESS_SHARED);
            if rc == 0 {
                rc = libc::pthread_condattr_setclock(attr_ptr, libc::CLOCK_MONOTONIC);
            }
            if rc != 0 {
                libc::pthread_condattr_destroy(attr_ptr);
                return Err(attr_err(rc));
            }

            let rc = libc::pthread_cond_init(self.raw.get(), attr_ptr);
            libc::pthread_condattr_destroy(attr_ptr);
            if rc != 0 {
                return Err(ShmError::CondvarInit {
                    primitive,
                    errno: Errno::from_raw(rc),
                });
            }
        }
        Ok(())
    }

    /// Wake every waiter.
    pub fn notify_all(&self, primitive: &'static str) -> ShmResult<()> {
        // SAFETY: raw was initialised by the region server.
        let rc = unsafe { libc::pthread_cond_broadcast(self.raw.get()) };
        if rc != 0 {
            return Err(ShmError::Condvar {
                primitive,
                errno: Errno::from_raw(rc),
            });
        }
        Ok(())
    }

    /// Wait until notified or `deadline` passes. Returns `true` on timeout.
    ///
    /// Spurious wakeups return `false`; callers re-check their predicate.
    pub fn wait_until<T>(
        &self,
        guard: &mut ShmMutexGuard<'_, T>,
        deadline: &Deadline,
        primitive: &'static str,
    ) -> ShmResult<bool> {
        // SAFETY: the guard holds its mutex, as pthread_cond_timedwait requires.
        let rc = unsafe {
            libc::pthread_cond_timedwait(self.raw.get(), guard.mutex.raw.get(), &deadline.0)
        };
        match rc {
            0 => Ok(false),
            libc::ETIMEDOUT => Ok(true),
            #[cfg(target_os = "linux")]
            libc::EOWNERDEAD => {
                guard.mutex.recover(guard.primitive);
                Ok(false)
            }
            rc => Err(ShmError::Condvar {
                primitive,
                errno: Errno::from_raw(rc),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn boxed<T>(value: T) -> Box<ShmMutex<T>> {
        let mutex = Box::new(ShmMutex {
            // SAFETY: zeroed pthread_mutex_t is overwritten by init.
            raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            data: UnsafeCell::new(value),
        });
        unsafe { mutex.init("test").unwrap() };
        mutex
    }

    #[test]
    fn lock_guards_data() {
        let mutex = boxed(5u32);
        {
            let mut guard = mutex.lock("test").unwrap();
            *guard += 1;
        }
        assert_eq!(*mutex.lock("test").unwrap(), 6);
    }

    #[test]
    fn try_lock_reports_busy_from_other_thread() {
        let mutex: Arc<ShmMutex<u32>> = Arc::from(boxed(0u32));
        let guard = mutex.lock("test").unwrap();

        let other = Arc::clone(&mutex);
        let busy = std::thread::spawn(move || other.try_lock("test").unwrap().is_none())
            .join()
            .unwrap();
        assert!(busy);

        guard.unlock().unwrap();
        assert!(mutex.try_lock("test").unwrap().is_some());
    }

    #[test]
    fn timed_wait_expires() {
        let mutex = boxed(());
        let cond = Box::new(ShmCondvar {
            raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
        });
        unsafe { cond.init("test").unwrap() };

        let start = Instant::now();
        let deadline = Deadline::after(Duration::from_millis(20)).unwrap();
        let mut guard = mutex.lock("test").unwrap();
        let mut timed_out = false;
        while !timed_out {
            timed_out = cond.wait_until(&mut guard, &deadline, "test").unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
