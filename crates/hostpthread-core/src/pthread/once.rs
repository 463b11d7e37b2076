//! One-time initialization (`pthread_once`).

use parking_lot::OnceState;

/// Control object for [`Once::call_once`]. `Once::new()` is
/// `PTHREAD_ONCE_INIT`.
#[derive(Debug)]
pub struct Once {
    inner: parking_lot::Once,
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

impl Once {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::Once::new(),
        }
    }

    /// Runs `routine` exactly once across all callers. Concurrent callers
    /// block until it finishes. If it unwinds, a later call runs it again.
    pub fn call_once(&self, routine: impl FnOnce()) {
        self.inner.call_once_force(|state| {
            if state == OnceState::Poisoned {
                crate::log::record(crate::config::LogLevel::Debug, "once_retry", |e| e);
            }
            routine();
        });
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.state().done()
    }
}
