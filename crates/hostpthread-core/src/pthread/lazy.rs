//! Three-state lazy initialization shared by every primitive.
//!
//! `UNINITIALIZED (0) -> INITIALIZING (1) -> INITIALIZED (2)`. The all-zero
//! bit pattern is `UNINITIALIZED`, so zeroed storage and static initializers
//! are valid unconstructed objects. Any other state byte is treated as stale
//! storage and coerced to `UNINITIALIZED` by the next initializer.
//!
//! The caller that wins `UNINITIALIZED -> INITIALIZING` constructs the
//! payload; everyone else spins (bounded by [`config::spin_limit`]) and then
//! yields until the winner publishes `INITIALIZED` or gives up.

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::{self, MaybeUninit};
use core::sync::atomic::{AtomicU8, Ordering};

use crate::config;
use crate::error::{PthreadError, Result};

pub const UNINITIALIZED: u8 = 0;
pub const INITIALIZING: u8 = 1;
pub const INITIALIZED: u8 = 2;

/// Observable lifecycle state of a primitive descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyState {
    Uninitialized,
    Initializing,
    Initialized,
}

impl LazyState {
    /// Decodes a raw state byte; out-of-range values read as `Uninitialized`.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            INITIALIZING => Self::Initializing,
            INITIALIZED => Self::Initialized,
            _ => Self::Uninitialized,
        }
    }
}

/// Lazily constructed payload with an explicit state word.
pub struct Lazy<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the payload is only shared after the Release store of INITIALIZED,
// and only mutated (constructed or dropped) by the single thread that owns
// the INITIALIZING state.
unsafe impl<T: Send + Sync> Sync for Lazy<T> {}
unsafe impl<T: Send> Send for Lazy<T> {}

impl<T> Lazy<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[must_use]
    pub fn state(&self) -> LazyState {
        LazyState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// The payload, if construction has completed.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == INITIALIZED {
            // SAFETY: INITIALIZED was published with Release after the write.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Returns the payload, constructing it with `make` if nobody has yet.
    ///
    /// At most one caller runs `make`. If it fails (or panics) the state goes
    /// back to `UNINITIALIZED`, the error is returned to that caller, and any
    /// waiters race for the next attempt.
    pub fn get_or_try_init(&self, make: impl FnOnce() -> Result<T>) -> Result<&T> {
        let mut make = Some(make);
        loop {
            let raw = self.state.load(Ordering::Acquire);
            match raw {
                INITIALIZED => {
                    // SAFETY: see `get`.
                    return Ok(unsafe { (*self.value.get()).assume_init_ref() });
                }
                INITIALIZING => self.wait_while_initializing(),
                _ => {
                    if self
                        .state
                        .compare_exchange(raw, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }
                    let Some(make) = make.take() else {
                        self.state.store(UNINITIALIZED, Ordering::Release);
                        return Err(PthreadError::InvalidArgument);
                    };
                    let guard = ResetOnUnwind { state: &self.state };
                    let built = make();
                    mem::forget(guard);
                    return match built {
                        Ok(value) => {
                            // SAFETY: we own INITIALIZING; nobody reads the slot.
                            let slot = unsafe { &mut *self.value.get() };
                            slot.write(value);
                            self.state.store(INITIALIZED, Ordering::Release);
                            // SAFETY: just written.
                            Ok(unsafe { slot.assume_init_ref() })
                        }
                        Err(e) => {
                            self.state.store(UNINITIALIZED, Ordering::Release);
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// Tears the payload down, returning the descriptor to `UNINITIALIZED`.
    ///
    /// Only the caller that wins `INITIALIZED -> INITIALIZING` proceeds;
    /// anyone else gets `InvalidArgument`. `check` may veto the release (for
    /// example a held lock reports `Busy`), which restores `INITIALIZED`.
    ///
    /// # Safety
    ///
    /// No other thread may be using a reference obtained from [`Lazy::get`]
    /// or [`Lazy::get_or_try_init`] on this descriptor.
    pub unsafe fn release_with(&self, check: impl FnOnce(&T) -> Result<()>) -> Result<()> {
        if self
            .state
            .compare_exchange(INITIALIZED, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(PthreadError::InvalidArgument);
        }
        // SAFETY: INITIALIZED was observed, so the payload is constructed.
        let value = unsafe { (*self.value.get()).assume_init_ref() };
        if let Err(e) = check(value) {
            self.state.store(INITIALIZED, Ordering::Release);
            return Err(e);
        }
        // SAFETY: we own INITIALIZING and the caller guarantees no other users.
        unsafe { (*self.value.get()).assume_init_drop() };
        self.state.store(UNINITIALIZED, Ordering::Release);
        Ok(())
    }

    fn wait_while_initializing(&self) {
        let limit = config::spin_limit();
        let mut spins = 0u32;
        while self.state.load(Ordering::Acquire) == INITIALIZING {
            if spins < limit {
                spins += 1;
                core::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_raw_state(raw: u8) -> Self {
        assert!(raw != INITIALIZED && raw != INITIALIZING);
        Self {
            state: AtomicU8::new(raw),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Lazy<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == INITIALIZED {
            // SAFETY: exclusive access and the payload is constructed.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Lazy");
        d.field("state", &self.state());
        if let Some(value) = self.get() {
            d.field("value", value);
        }
        d.finish()
    }
}

struct ResetOnUnwind<'a> {
    state: &'a AtomicU8,
}

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        self.state.store(UNINITIALIZED, Ordering::Release);
    }
}
