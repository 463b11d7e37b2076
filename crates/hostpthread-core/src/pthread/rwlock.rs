//! POSIX reader-writer lock.
//!
//! The host lock does not remember which mode a thread holds, so each lock
//! owns a host TLS slot holding the calling thread's *mode trail*: a word
//! with one bit per held level (1 = exclusive, 0 = shared) above a sentinel
//! bit. Acquires push after the host acquire succeeds; `unlock` releases the
//! mode of the top bit and pops it.

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::attr::RwLockAttr;
use super::host::{HostRwLock, TlsSlot};
use super::lazy::{Lazy, LazyState};
use super::local;

const EMPTY_TRAIL: usize = 1;
const SHARED: usize = 0;
const EXCLUSIVE: usize = 1;

/// Maximum number of levels one thread can hold on one lock.
pub const MAX_TRAIL_DEPTH: u32 = usize::BITS - 1;

const fn trail_from_slot(raw: usize) -> usize {
    if raw == 0 { EMPTY_TRAIL } else { raw }
}

const fn trail_depth(trail: usize) -> u32 {
    usize::BITS - 1 - trail.leading_zeros()
}

/// Shared levels recorded in the trail.
const fn shared_levels(trail: usize) -> usize {
    (trail_depth(trail) - (trail.count_ones() - 1)) as usize
}

const fn trail_push(trail: usize, mode: usize) -> Result<usize> {
    if trail_depth(trail) >= MAX_TRAIL_DEPTH {
        Err(PthreadError::ResourceExhausted)
    } else {
        Ok((trail << 1) | mode)
    }
}

#[derive(Debug)]
struct RwLockInner {
    host: HostRwLock,
    trail: TlsSlot,
}

impl RwLockInner {
    fn build(attr: &RwLockAttr) -> Result<Self> {
        attr.pshared.require_private().inspect_err(|e| {
            log::record(LogLevel::Warn, "unsupported", |entry| {
                entry.with_object("rwlock").with_errno(e.errno())
            });
        })?;
        let trail = TlsSlot::alloc().inspect_err(|e| {
            log::record(LogLevel::Error, "slot_exhausted", |entry| {
                entry.with_object("rwlock").with_errno(e.errno())
            });
        })?;
        log::record(LogLevel::Trace, "primitive_init", |e| e.with_object("rwlock"));
        Ok(Self {
            host: HostRwLock::new(),
            trail,
        })
    }

    fn load_trail(&self) -> Result<usize> {
        local::with_slots(|t| trail_from_slot(t.get(self.trail)))
            .ok_or(PthreadError::ResourceExhausted)
    }

    fn store_trail(&self, trail: usize) {
        let raw = if trail == EMPTY_TRAIL { 0 } else { trail };
        let _ = local::with_slots(|t| t.set(self.trail, raw));
    }
}

impl Drop for RwLockInner {
    fn drop(&mut self) {
        self.trail.free();
    }
}

/// Lazily constructed reader-writer lock.
#[derive(Debug, Default)]
pub struct RwLock {
    inner: Lazy<RwLockInner>,
}

impl RwLock {
    /// Equivalent of `PTHREAD_RWLOCK_INITIALIZER`.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Lazy::new() }
    }

    #[must_use]
    pub fn state(&self) -> LazyState {
        self.inner.state()
    }

    /// `ResourceExhausted` if no host slot is left for the mode trail.
    pub fn init(&self, attr: Option<&RwLockAttr>) -> Result<()> {
        let attr = attr.copied().unwrap_or_default();
        self.inner.get_or_try_init(|| RwLockInner::build(&attr))?;
        Ok(())
    }

    /// `InvalidArgument` if not live, `Busy` while any thread holds it.
    ///
    /// # Safety
    ///
    /// No other thread may be blocked in or concurrently calling any
    /// operation on this lock.
    pub unsafe fn destroy(&self) -> Result<()> {
        // SAFETY: forwarded caller contract.
        unsafe {
            self.inner.release_with(|l| {
                if l.host.is_held() {
                    Err(PthreadError::Busy)
                } else {
                    Ok(())
                }
            })
        }?;
        log::record(LogLevel::Trace, "primitive_destroy", |e| e.with_object("rwlock"));
        Ok(())
    }

    fn live(&self) -> Result<&RwLockInner> {
        self.inner
            .get_or_try_init(|| RwLockInner::build(&RwLockAttr::default()))
    }

    pub fn read_lock(&self) -> Result<()> {
        let l = self.live()?;
        let next = trail_push(l.load_trail()?, SHARED)?;
        l.host.lock_shared();
        l.store_trail(next);
        Ok(())
    }

    /// `Busy` if another thread holds the lock exclusively.
    pub fn try_read_lock(&self) -> Result<()> {
        let l = self.live()?;
        let next = trail_push(l.load_trail()?, SHARED)?;
        if !l.host.try_lock_shared() {
            return Err(PthreadError::Busy);
        }
        l.store_trail(next);
        Ok(())
    }

    /// Blocks until every other holder is gone. A caller holding only shared
    /// levels nests an exclusive level once it is the sole reader.
    pub fn write_lock(&self) -> Result<()> {
        let l = self.live()?;
        let trail = l.load_trail()?;
        let next = trail_push(trail, EXCLUSIVE)?;
        l.host.lock_exclusive(shared_levels(trail));
        l.store_trail(next);
        Ok(())
    }

    /// `Busy` if any other thread holds the lock.
    pub fn try_write_lock(&self) -> Result<()> {
        let l = self.live()?;
        let trail = l.load_trail()?;
        let next = trail_push(trail, EXCLUSIVE)?;
        if !l.host.try_lock_exclusive(shared_levels(trail)) {
            return Err(PthreadError::Busy);
        }
        l.store_trail(next);
        Ok(())
    }

    /// Releases the most recently acquired level held by the caller.
    ///
    /// `InvalidArgument` before first use, `NotPermitted` if the caller
    /// holds no level.
    pub fn unlock(&self) -> Result<()> {
        let l = self.inner.get().ok_or(PthreadError::InvalidArgument)?;
        let trail = l.load_trail().map_err(|_| PthreadError::NotPermitted)?;
        if trail == EMPTY_TRAIL {
            return Err(PthreadError::NotPermitted);
        }
        if trail & 1 == EXCLUSIVE {
            l.host.unlock_exclusive();
        } else {
            l.host.unlock_shared();
        }
        l.store_trail(trail >> 1);
        Ok(())
    }

    /// Levels the calling thread holds on this lock.
    #[must_use]
    pub fn held_levels(&self) -> u32 {
        self.inner
            .get()
            .and_then(|l| l.load_trail().ok())
            .map_or(0, trail_depth)
    }
}
