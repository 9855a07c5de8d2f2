//! The wake/wait primitive connecting the master to parked helpers.
//!
//! Helper threads park between ticks; at tick start the master posts one
//! wake per helper it wants draining the queue. The executor core never
//! blocks on this primitive; it is used strictly at tick boundaries, by
//! the worker pool.

use crate::error::Result;

#[cfg(target_os = "linux")]
use crate::error::Error;
#[cfg(target_os = "linux")]
use rustix::event::{EventfdFlags, eventfd};
#[cfg(target_os = "linux")]
use rustix::fd::OwnedFd;

/// Counting wake primitive.
///
/// `post(n)` releases up to `n` waiters; wakes posted with no waiter
/// present are banked and satisfy future waits. Implementations must
/// tolerate posts from one thread racing waits from many.
pub trait WakeSignal: Send + Sync + 'static {
    /// Release `count` waiters, banking surplus wakes.
    fn post(&self, count: usize);

    /// Block until a wake is available, consuming exactly one.
    fn wait(&self);
}

/// Default [`WakeSignal`]: a counting semaphore.
///
/// On Linux this is an `eventfd` in semaphore mode, so parked helpers
/// sleep in the kernel and each wake releases exactly one of them. Other
/// platforms fall back to a mutex/condvar pair.
#[cfg(target_os = "linux")]
pub struct TickSemaphore {
    fd: OwnedFd,
}

#[cfg(target_os = "linux")]
impl TickSemaphore {
    /// Create a semaphore with no banked wakes.
    pub fn new() -> Result<Self> {
        let fd = eventfd(0, EventfdFlags::SEMAPHORE | EventfdFlags::CLOEXEC)
            .map_err(|e| Error::Io(std::io::Error::other(format!("eventfd: {}", e))))?;
        Ok(Self { fd })
    }
}

#[cfg(target_os = "linux")]
impl WakeSignal for TickSemaphore {
    fn post(&self, count: usize) {
        if count == 0 {
            return;
        }
        // The write can only fail on counter overflow, which would take
        // 2^64 - 1 banked wakes.
        let bytes = (count as u64).to_ne_bytes();
        let _ = rustix::io::write(&self.fd, &bytes);
    }

    fn wait(&self) {
        let mut buf = [0u8; 8];
        loop {
            match rustix::io::read(&self.fd, &mut buf) {
                Ok(8) => return,
                Ok(_) => continue,
                Err(rustix::io::Errno::INTR) => continue,
                // Other errnos cannot occur on a healthy eventfd; treat as
                // a spurious wake rather than wedging the helper.
                Err(_) => return,
            }
        }
    }
}

/// Fallback semaphore for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
pub struct TickSemaphore {
    count: std::sync::Mutex<usize>,
    available: std::sync::Condvar,
}

#[cfg(not(target_os = "linux"))]
impl TickSemaphore {
    /// Create a semaphore with no banked wakes.
    pub fn new() -> Result<Self> {
        Ok(Self {
            count: std::sync::Mutex::new(0),
            available: std::sync::Condvar::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl WakeSignal for TickSemaphore {
    fn post(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut banked = self.lock();
        *banked += count;
        self.available.notify_all();
    }

    fn wait(&self) {
        let mut banked = self.lock();
        loop {
            if *banked > 0 {
                *banked -= 1;
                return;
            }
            banked = match self.available.wait(banked) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}
