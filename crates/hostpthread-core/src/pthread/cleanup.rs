//! Cleanup-handler stack.
//!
//! [`cleanup_push`] registers a handler on the calling thread and returns a
//! guard. [`CleanupGuard::pop`] removes it, optionally running it. A guard
//! dropped while the thread unwinds (through [`super::thread::exit`] or
//! cancellation) runs its handler, so handlers fire innermost first. A guard
//! dropped on a normal scope exit without `pop` discards its handler.
//!
//! [`push_handler`]/[`pop_handler`] are the unscoped pair used by the C
//! boundary. Handlers they leave behind run on the exit path.

use core::marker::PhantomData;

use super::local;

/// Scope guard for one pushed cleanup handler. Not `Send`: the handler lives
/// on the pushing thread's stack.
#[must_use = "dropping the guard immediately discards the handler"]
#[derive(Debug)]
pub struct CleanupGuard {
    index: Option<usize>,
    _thread_bound: PhantomData<*const ()>,
}

/// Registers `handler` on the calling thread's cleanup stack.
pub fn cleanup_push(handler: impl FnOnce() + 'static) -> CleanupGuard {
    CleanupGuard {
        index: local::push_cleanup(Box::new(handler)),
        _thread_bound: PhantomData,
    }
}

impl CleanupGuard {
    /// Removes the handler, running it when `execute` is true.
    ///
    /// Handlers pushed above this one and never popped are removed with it,
    /// innermost first.
    pub fn pop(mut self, execute: bool) {
        if let Some(index) = self.index.take() {
            run_from(index, execute);
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(index) = self.index.take() {
            // Entries may already be gone if the exit path consumed them.
            run_from(index, std::thread::panicking());
        }
    }
}

fn run_from(index: usize, execute: bool) {
    let handlers = local::split_cleanup(index);
    if execute {
        for handler in handlers.into_iter().rev() {
            handler();
        }
    }
}

/// Unscoped push, mirroring `pthread_cleanup_push`.
pub fn push_handler(handler: impl FnOnce() + 'static) {
    let _ = local::push_cleanup(Box::new(handler));
}

/// Unscoped pop, mirroring `pthread_cleanup_pop`. Returns false if the stack
/// was empty.
pub fn pop_handler(execute: bool) -> bool {
    match local::pop_cleanup() {
        Some(handler) => {
            if execute {
                handler();
            }
            true
        }
        None => false,
    }
}

/// Runs every remaining handler, innermost first. Part of the exit path.
pub(crate) fn unwind_all() -> usize {
    let mut ran = 0;
    while let Some(handler) = local::pop_cleanup() {
        handler();
        ran += 1;
    }
    ran
}
