//! POSIX condition variable.
//!
//! Waits release every recursion level of the associated mutex and restore
//! the same depth before returning. Timed waits take an absolute wall-clock
//! deadline; clock adjustments during the wait are not compensated.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::attr::CondAttr;
use super::host::{HostCondvar, WaitOutcome};
use super::lazy::{Lazy, LazyState};
use super::mutex::Mutex;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Absolute wall-clock deadline, as in `struct timespec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    #[must_use]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, i64::from(d.subsec_nanos())),
            Err(e) => {
                let d = e.duration();
                Self::new(-(d.as_secs() as i64), -i64::from(d.subsec_nanos())).normalized()
            }
        }
    }

    /// `self` shifted by `d`, saturating at the representable range.
    #[must_use]
    pub fn after(self, d: Duration) -> Self {
        let nsec = self.nsec + i64::from(d.subsec_nanos());
        let sec = self
            .sec
            .saturating_add(i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        Self::new(sec.saturating_add(nsec / NANOS_PER_SEC), nsec % NANOS_PER_SEC)
    }

    fn normalized(self) -> Self {
        if self.nsec < 0 {
            Self::new(self.sec - 1, self.nsec + NANOS_PER_SEC)
        } else {
            self
        }
    }

    /// `InvalidArgument` unless `nsec` is in `[0, 1e9)`.
    pub const fn validate(self) -> Result<()> {
        if self.nsec < 0 || self.nsec >= NANOS_PER_SEC {
            Err(PthreadError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// Time left until this deadline, zero if it already passed.
    fn remaining(self) -> Duration {
        let now = Self::now();
        let mut sec = self.sec.saturating_sub(now.sec);
        let mut nsec = self.nsec - now.nsec;
        if nsec < 0 {
            sec = sec.saturating_sub(1);
            nsec += NANOS_PER_SEC;
        }
        if sec < 0 {
            return Duration::ZERO;
        }
        Duration::new(sec as u64, nsec as u32)
    }
}

#[derive(Debug)]
struct CondInner {
    host: HostCondvar,
}

impl CondInner {
    fn build(attr: &CondAttr) -> Result<Self> {
        attr.pshared.require_private().inspect_err(|e| {
            log::record(LogLevel::Warn, "unsupported", |entry| {
                entry.with_object("cond").with_errno(e.errno())
            });
        })?;
        log::record(LogLevel::Trace, "primitive_init", |e| e.with_object("cond"));
        Ok(Self {
            host: HostCondvar::new(),
        })
    }
}

/// Lazily constructed condition variable.
#[derive(Debug, Default)]
pub struct Cond {
    inner: Lazy<CondInner>,
}

impl Cond {
    /// Equivalent of `PTHREAD_COND_INITIALIZER`.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Lazy::new() }
    }

    #[must_use]
    pub fn state(&self) -> LazyState {
        self.inner.state()
    }

    pub fn init(&self, attr: Option<&CondAttr>) -> Result<()> {
        let attr = attr.copied().unwrap_or_default();
        self.inner.get_or_try_init(|| CondInner::build(&attr))?;
        Ok(())
    }

    /// `InvalidArgument` if not live.
    ///
    /// # Safety
    ///
    /// No thread may be waiting on, or concurrently operating on, this
    /// condition variable.
    pub unsafe fn destroy(&self) -> Result<()> {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release_with(|_| Ok(())) }?;
        log::record(LogLevel::Trace, "primitive_destroy", |e| e.with_object("cond"));
        Ok(())
    }

    /// Wakes one waiter. A no-op without waiters or before first use.
    pub fn signal(&self) {
        if let Some(c) = self.inner.get() {
            c.host.notify_one();
        }
    }

    /// Wakes every waiter. A no-op without waiters or before first use.
    pub fn broadcast(&self) {
        if let Some(c) = self.inner.get() {
            c.host.notify_all();
        }
    }

    /// Blocks until signaled. `mutex` must be live and held by the caller
    /// (`InvalidArgument` / `NotPermitted` otherwise).
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        self.wait_inner(mutex, None).map(|_| ())
    }

    /// Like [`Cond::wait`], but gives up at `deadline` with `TimedOut`.
    /// A deadline in the past times out without blocking; one beyond what
    /// `Instant` can represent waits without a timeout.
    pub fn timed_wait(&self, mutex: &Mutex, deadline: Timespec) -> Result<()> {
        deadline.validate()?;
        let at = Instant::now().checked_add(deadline.remaining());
        match self.wait_inner(mutex, at)? {
            WaitOutcome::Signaled => Ok(()),
            WaitOutcome::TimedOut => Err(PthreadError::TimedOut),
        }
    }

    fn wait_inner(&self, mutex: &Mutex, deadline: Option<Instant>) -> Result<WaitOutcome> {
        let host_mutex = mutex.host().ok_or(PthreadError::InvalidArgument)?;
        let cond = self
            .inner
            .get_or_try_init(|| CondInner::build(&CondAttr::default()))?;
        cond.host.wait(host_mutex, deadline)
    }
}
