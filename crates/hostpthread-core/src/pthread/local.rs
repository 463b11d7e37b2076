//! Per-thread context.
//!
//! Everything a thread owns exclusively lives in one thread-local value:
//! its "self" control block, its cleanup-handler stack, and its host slot
//! values. Keeping them together fixes their teardown order. When the host
//! destroys the context of a thread that never went through the exit path,
//! [`Drop`] runs that path on the context's own fields.
//!
//! Accessors return `None` once teardown has begun; callbacks running from
//! teardown see empty state.

use core::cell::{Cell, RefCell};
use core::mem;
use std::sync::Arc;

use super::host::SlotTable;
use super::thread::{self, ControlBlock};
use super::tls;

/// Deferred routine on the cleanup stack.
pub(crate) type CleanupEntry = Box<dyn FnOnce()>;

struct ThreadEnv {
    control: RefCell<Option<Arc<ControlBlock>>>,
    cleanup: RefCell<Vec<CleanupEntry>>,
    slots: RefCell<SlotTable>,
    /// Key destructors were already dispatched by the exit path.
    dispatched: Cell<bool>,
}

impl ThreadEnv {
    const fn new() -> Self {
        Self {
            control: RefCell::new(None),
            cleanup: RefCell::new(Vec::new()),
            slots: RefCell::new(SlotTable::new()),
            dispatched: Cell::new(false),
        }
    }
}

impl Drop for ThreadEnv {
    fn drop(&mut self) {
        let handlers = mem::take(self.cleanup.get_mut());
        for handler in handlers.into_iter().rev() {
            handler();
        }
        let slots = self.slots.get_mut();
        if !self.dispatched.get() && !slots.is_empty() {
            tls::dispatch_exit_destructors(&mut |slot| slots.take(slot));
        }
        if let Some(block) = self.control.get_mut().take() {
            thread::finish_at_teardown(&block);
        }
    }
}

thread_local! {
    static ENV: ThreadEnv = const { ThreadEnv::new() };
}

/// Runs `f` on the calling thread's slot table.
pub(crate) fn with_slots<R>(f: impl FnOnce(&mut SlotTable) -> R) -> Option<R> {
    ENV.try_with(|env| env.slots.try_borrow_mut().ok().map(|mut t| f(&mut t)))
        .ok()
        .flatten()
}

/// The calling thread's control block, if one is installed.
pub(crate) fn control() -> Option<Arc<ControlBlock>> {
    ENV.try_with(|env| env.control.try_borrow().ok().and_then(|c| c.clone()))
        .ok()
        .flatten()
}

/// Installs or clears "self". Returns false once teardown has begun.
pub(crate) fn set_control(block: Option<Arc<ControlBlock>>) -> bool {
    ENV.try_with(|env| match env.control.try_borrow_mut() {
        Ok(mut c) => {
            *c = block;
            true
        }
        Err(_) => false,
    })
    .unwrap_or(false)
}

/// Claims the calling thread's single key-destructor dispatch. False if it
/// already happened or teardown has begun.
pub(crate) fn claim_dispatch() -> bool {
    ENV.try_with(|env| !env.dispatched.replace(true))
        .unwrap_or(false)
}

/// Pushes a cleanup handler, returning its stack index.
pub(crate) fn push_cleanup(entry: CleanupEntry) -> Option<usize> {
    ENV.try_with(|env| {
        let mut stack = env.cleanup.try_borrow_mut().ok()?;
        stack.push(entry);
        Some(stack.len() - 1)
    })
    .ok()
    .flatten()
}

/// Pops the most recently pushed handler.
pub(crate) fn pop_cleanup() -> Option<CleanupEntry> {
    ENV.try_with(|env| env.cleanup.try_borrow_mut().ok()?.pop())
        .ok()
        .flatten()
}

/// Removes every handler at `index` and above, in push order.
pub(crate) fn split_cleanup(index: usize) -> Vec<CleanupEntry> {
    ENV.try_with(|env| {
        env.cleanup
            .try_borrow_mut()
            .map(|mut stack| {
                if index < stack.len() {
                    stack.split_off(index)
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default()
    })
    .unwrap_or_default()
}

/// Number of handlers on the calling thread's cleanup stack.
#[cfg(test)]
pub(crate) fn cleanup_depth() -> usize {
    ENV.try_with(|env| env.cleanup.try_borrow().map(|s| s.len()).unwrap_or(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pthread::tls;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread as std_thread;

    #[test]
    fn cleanup_stack_is_lifo_and_per_thread() {
        let base = cleanup_depth();
        assert_eq!(push_cleanup(Box::new(|| {})), Some(base));
        assert_eq!(push_cleanup(Box::new(|| {})), Some(base + 1));
        let other = std_thread::spawn(cleanup_depth).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(split_cleanup(base).len(), 2);
        assert_eq!(cleanup_depth(), base);
    }

    #[test]
    fn teardown_dispatches_destructors_for_plain_threads() {
        let _g = tls::TEST_LOCK.lock();
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        let key = tls::key_create(Some(Box::new(|v| {
            SEEN.store(v, Ordering::SeqCst);
        })))
        .unwrap();
        std_thread::spawn(move || {
            tls::set_specific(key, 31).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(SEEN.load(Ordering::SeqCst), 31);
        tls::key_delete(key).unwrap();
    }

    #[test]
    fn teardown_runs_pending_cleanup_handlers() {
        static RAN: AtomicUsize = AtomicUsize::new(0);
        std_thread::spawn(|| {
            push_cleanup(Box::new(|| {
                RAN.fetch_add(1, Ordering::SeqCst);
            }));
        })
        .join()
        .unwrap();
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
    }
}
