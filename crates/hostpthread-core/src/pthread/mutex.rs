//! POSIX mutex.
//!
//! Locking is always recursive regardless of the requested type. `lock` and
//! `try_lock` construct the mutex on first use, which is what makes the
//! static initializer work.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::attr::MutexAttr;
use super::host::HostMutex;
use super::lazy::{Lazy, LazyState};

#[derive(Debug)]
struct MutexInner {
    host: HostMutex,
    prio_ceiling: AtomicI32,
}

impl MutexInner {
    fn build(attr: &MutexAttr) -> Result<Self> {
        attr.pshared.require_private().inspect_err(|e| {
            log::record(LogLevel::Warn, "unsupported", |entry| {
                entry.with_object("mutex").with_errno(e.errno())
            });
        })?;
        log::record(LogLevel::Trace, "primitive_init", |e| e.with_object("mutex"));
        Ok(Self {
            host: HostMutex::new(),
            prio_ceiling: AtomicI32::new(attr.prio_ceiling),
        })
    }
}

/// Lazily constructed recursive mutex.
#[derive(Debug, Default)]
pub struct Mutex {
    inner: Lazy<MutexInner>,
}

impl Mutex {
    /// Equivalent of `PTHREAD_MUTEX_INITIALIZER`.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Lazy::new() }
    }

    #[must_use]
    pub fn state(&self) -> LazyState {
        self.inner.state()
    }

    /// Constructs the mutex. Succeeds without effect if it is already live.
    pub fn init(&self, attr: Option<&MutexAttr>) -> Result<()> {
        let attr = attr.copied().unwrap_or_default();
        self.inner.get_or_try_init(|| MutexInner::build(&attr))?;
        Ok(())
    }

    /// Releases the host lock and returns the mutex to its initializer state.
    ///
    /// `InvalidArgument` if not live, `Busy` if some thread holds it.
    ///
    /// # Safety
    ///
    /// No other thread may be blocked in or concurrently calling any
    /// operation on this mutex or a condition variable waiting with it.
    pub unsafe fn destroy(&self) -> Result<()> {
        // SAFETY: forwarded caller contract.
        unsafe {
            self.inner.release_with(|m| {
                if m.host.is_locked() {
                    Err(PthreadError::Busy)
                } else {
                    Ok(())
                }
            })
        }?;
        log::record(LogLevel::Trace, "primitive_destroy", |e| e.with_object("mutex"));
        Ok(())
    }

    fn live(&self) -> Result<&MutexInner> {
        self.inner
            .get_or_try_init(|| MutexInner::build(&MutexAttr::default()))
    }

    pub fn lock(&self) -> Result<()> {
        self.live()?.host.lock()
    }

    /// `Busy` if another thread holds the mutex; never blocks.
    pub fn try_lock(&self) -> Result<()> {
        self.live()?.host.try_lock()
    }

    /// `InvalidArgument` before first use, `NotPermitted` for a non-owner.
    pub fn unlock(&self) -> Result<()> {
        self.inner
            .get()
            .ok_or(PthreadError::InvalidArgument)?
            .host
            .unlock()
    }

    pub fn prio_ceiling(&self) -> Result<i32> {
        let m = self.inner.get().ok_or(PthreadError::InvalidArgument)?;
        Ok(m.prio_ceiling.load(Ordering::Relaxed))
    }

    /// Stores a new ceiling and returns the previous one. Metadata only.
    pub fn set_prio_ceiling(&self, ceiling: i32) -> Result<i32> {
        let m = self.inner.get().ok_or(PthreadError::InvalidArgument)?;
        Ok(m.prio_ceiling.swap(ceiling, Ordering::Relaxed))
    }

    /// Host lock of a live mutex, for condition variable waits.
    pub(crate) fn host(&self) -> Option<&HostMutex> {
        self.inner.get().map(|m| &m.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pthread::attr::PShared;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn static_initializer_auto_inits_on_lock() {
        let m = Mutex::new();
        assert_eq!(m.state(), LazyState::Uninitialized);
        m.lock().unwrap();
        assert_eq!(m.state(), LazyState::Initialized);
        m.unlock().unwrap();
    }

    #[test]
    fn unlock_before_use_is_invalid() {
        let m = Mutex::new();
        assert_eq!(m.unlock(), Err(PthreadError::InvalidArgument));
        assert_eq!(m.prio_ceiling(), Err(PthreadError::InvalidArgument));
        assert_eq!(m.set_prio_ceiling(3), Err(PthreadError::InvalidArgument));
    }

    #[test]
    fn recursive_regardless_of_type() {
        let m = Mutex::new();
        let attr = MutexAttr {
            kind: crate::pthread::attr::MutexType::Normal,
            ..MutexAttr::default()
        };
        m.init(Some(&attr)).unwrap();
        m.lock().unwrap();
        m.lock().unwrap();
        m.unlock().unwrap();
        m.unlock().unwrap();
        assert_eq!(m.unlock(), Err(PthreadError::NotPermitted));
    }

    #[test]
    fn try_lock_reports_busy_across_threads() {
        let m = Arc::new(Mutex::new());
        m.lock().unwrap();
        let m2 = Arc::clone(&m);
        assert_eq!(
            thread::spawn(move || m2.try_lock()).join().unwrap(),
            Err(PthreadError::Busy)
        );
        m.unlock().unwrap();
        let m3 = Arc::clone(&m);
        thread::spawn(move || {
            m3.try_lock().unwrap();
            m3.unlock().unwrap();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn destroy_rules() {
        let m = Mutex::new();
        assert_eq!(unsafe { m.destroy() }, Err(PthreadError::InvalidArgument));
        m.init(None).unwrap();
        m.lock().unwrap();
        assert_eq!(unsafe { m.destroy() }, Err(PthreadError::Busy));
        m.unlock().unwrap();
        unsafe { m.destroy() }.unwrap();
        assert_eq!(m.state(), LazyState::Uninitialized);
        // destroy then init behaves like a fresh init
        m.init(None).unwrap();
        m.lock().unwrap();
        m.unlock().unwrap();
    }

    #[test]
    fn prio_ceiling_roundtrip() {
        let m = Mutex::new();
        let attr = MutexAttr {
            prio_ceiling: 4,
            ..MutexAttr::default()
        };
        m.init(Some(&attr)).unwrap();
        assert_eq!(m.prio_ceiling(), Ok(4));
        assert_eq!(m.set_prio_ceiling(9), Ok(4));
        assert_eq!(m.prio_ceiling(), Ok(9));
    }

    #[test]
    fn process_shared_is_not_supported() {
        let m = Mutex::new();
        let attr = MutexAttr {
            pshared: PShared::Shared,
            ..MutexAttr::default()
        };
        assert_eq!(m.init(Some(&attr)), Err(PthreadError::NotSupported));
        assert_eq!(m.state(), LazyState::Uninitialized);
    }
}
