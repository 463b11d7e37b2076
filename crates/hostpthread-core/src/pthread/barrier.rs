//! POSIX barrier.

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::attr::{BarrierAttr, PTHREAD_BARRIER_SERIAL_THREAD};
use super::host::HostBarrier;
use super::lazy::{Lazy, LazyState};

/// Result of [`Barrier::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierWaitResult {
    /// The last arrival of its generation.
    Serial,
    NonSerial,
}

impl BarrierWaitResult {
    #[must_use]
    pub const fn is_serial(self) -> bool {
        matches!(self, Self::Serial)
    }

    /// C status: `PTHREAD_BARRIER_SERIAL_THREAD` or 0.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Serial => PTHREAD_BARRIER_SERIAL_THREAD,
            Self::NonSerial => 0,
        }
    }
}

/// Lazily constructed reusable barrier.
#[derive(Debug, Default)]
pub struct Barrier {
    inner: Lazy<HostBarrier>,
}

impl Barrier {
    /// An unconstructed barrier; [`Barrier::init`] supplies the count.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Lazy::new() }
    }

    #[must_use]
    pub fn state(&self) -> LazyState {
        self.inner.state()
    }

    /// `InvalidArgument` for a zero count.
    pub fn init(&self, attr: Option<&BarrierAttr>, count: u32) -> Result<()> {
        if count == 0 {
            return Err(PthreadError::InvalidArgument);
        }
        let attr = attr.copied().unwrap_or_default();
        self.inner.get_or_try_init(|| {
            attr.pshared.require_private()?;
            log::record(LogLevel::Trace, "primitive_init", |e| {
                e.with_object("barrier")
                    .with_detail(serde_json::json!({ "count": count }))
            });
            Ok(HostBarrier::new(count))
        })?;
        Ok(())
    }

    /// `InvalidArgument` if not live.
    ///
    /// # Safety
    ///
    /// No thread may be waiting on, or concurrently operating on, this
    /// barrier.
    pub unsafe fn destroy(&self) -> Result<()> {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release_with(|_| Ok(())) }?;
        log::record(LogLevel::Trace, "primitive_destroy", |e| e.with_object("barrier"));
        Ok(())
    }

    /// Blocks until `count` threads have arrived. `InvalidArgument` before
    /// [`Barrier::init`].
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let b = self.inner.get().ok_or(PthreadError::InvalidArgument)?;
        Ok(if b.wait() {
            BarrierWaitResult::Serial
        } else {
            BarrierWaitResult::NonSerial
        })
    }

    /// Party count of a live barrier.
    #[must_use]
    pub fn count(&self) -> Option<u32> {
        self.inner.get().map(HostBarrier::parties)
    }
}
