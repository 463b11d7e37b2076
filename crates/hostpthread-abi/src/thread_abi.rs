//! ABI layer for thread lifecycle, cancellation, cleanup handlers, and
//! `pthread_once`.
//!
//! `pthread_t` values are the core's process-unique thread ids. Start
//! routines use the `"C-unwind"` ABI so `pthread_exit` and cancellation can
//! unwind through them back to the thread's entry point.

use std::ffi::{c_int, c_void};

use hostpthread_core::error::{PthreadError, Result};
use hostpthread_core::pthread::{
    self, CancelState, CancelType, ExitStatus, Thread, cleanup, thread,
};

use crate::macros::abi_fn;
use crate::types::{pthread_attr_t, pthread_once_t, pthread_t};
use crate::util::{obj, put, put_opt, status};

/// C start routine.
pub type StartRoutine = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

/// C cleanup handler.
pub type CleanupRoutine = unsafe extern "C" fn(*mut c_void);

fn lookup(id: pthread_t) -> Result<Thread> {
    Thread::from_id(u64::from(id))
}

fn raw_id(t: &Thread) -> pthread_t {
    t.id() as pthread_t
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_create(
        thread: *mut pthread_t,
        attr: *const pthread_attr_t,
        start_routine: Option<StartRoutine>,
        arg: *mut c_void,
    ) -> c_int {
        status((|| -> Result<()> {
            if thread.is_null() {
                return Err(PthreadError::InvalidArgument);
            }
            let start = start_routine.ok_or(PthreadError::InvalidArgument)?;
            let attr = if attr.is_null() {
                None
            } else {
                Some(*obj(attr)?.get()?)
            };
            // Raw pointers are not `Send`; the address travels as a word.
            let arg = arg as usize;
            let t = pthread::create(attr.as_ref(), move || {
                // SAFETY: the creator vouches for `start` and `arg`.
                unsafe { start(arg as *mut c_void) as usize }
            })?;
            put(thread, raw_id(&t))
        })())
    }
}

/// Ends the calling thread by unwinding to its entry point.
#[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
pub extern "C-unwind" fn pthread_exit(value: *mut c_void) -> ! {
    thread::exit(value as usize)
}

abi_fn! {
    fn pthread_join(thread: pthread_t, retval: *mut *mut c_void) -> c_int {
        status(lookup(thread).and_then(|t| t.join()).map(|s: ExitStatus| {
            put_opt(retval, s.as_raw() as *mut c_void);
        }))
    }
}

abi_fn! {
    fn pthread_detach(thread: pthread_t) -> c_int {
        status(lookup(thread).and_then(|t| t.detach()))
    }
}

abi_fn! {
    fn pthread_self() -> pthread_t {
        raw_id(&thread::current())
    }
}

abi_fn! {
    fn pthread_equal(t1: pthread_t, t2: pthread_t) -> c_int {
        c_int::from(t1 == t2)
    }
}

abi_fn! {
    fn pthread_kill(thread: pthread_t, sig: c_int) -> c_int {
        status(lookup(thread).and_then(|t| t.kill(sig)))
    }
}

/// Environment hook: runs the exit path (cleanup handlers, key destructors,
/// detached release) for a thread that ends without returning from its start
/// routine or calling `pthread_exit`.
#[cfg_attr(feature = "export-symbols", unsafe(no_mangle))]
pub extern "C" fn hostpthread_thread_detach() {
    thread::detach_current();
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_cancel(thread: pthread_t) -> c_int {
        status(lookup(thread).and_then(|t| t.cancel()))
    }
}

abi_fn! {
    fn pthread_setcancelstate(state: c_int, oldstate: *mut c_int) -> c_int {
        status(CancelState::from_raw(state).map(|s| {
            let old = thread::set_cancel_state(s);
            put_opt(oldstate, old.as_raw());
        }))
    }
}

abi_fn! {
    fn pthread_setcanceltype(kind: c_int, oldtype: *mut c_int) -> c_int {
        status(
            CancelType::from_raw(kind)
                .and_then(thread::set_cancel_type)
                .map(|old| put_opt(oldtype, old.as_raw())),
        )
    }
}

abi_fn! {
    unwind fn pthread_testcancel() {
        thread::test_cancel();
    }
}

// ---------------------------------------------------------------------------
// Scheduling and concurrency
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_getschedparam(
        thread: pthread_t,
        policy: *mut c_int,
        param: *mut libc::sched_param,
    ) -> c_int {
        status((|| -> Result<()> {
            if policy.is_null() || param.is_null() {
                return Err(PthreadError::InvalidArgument);
            }
            let sp = lookup(thread)?.sched_param();
            put(policy, sp.policy)?;
            put(param, libc::sched_param { sched_priority: sp.priority })
        })())
    }
}

abi_fn! {
    fn pthread_setschedparam(
        thread: pthread_t,
        policy: c_int,
        param: *const libc::sched_param,
    ) -> c_int {
        status((|| -> Result<()> {
            let priority = obj(param)?.sched_priority;
            lookup(thread)?.set_sched_param(policy, priority)
        })())
    }
}

abi_fn! {
    fn pthread_getconcurrency() -> c_int {
        thread::concurrency()
    }
}

abi_fn! {
    fn pthread_setconcurrency(level: c_int) -> c_int {
        status(thread::set_concurrency(level))
    }
}

// ---------------------------------------------------------------------------
// Once and cleanup handlers
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_once(once_control: *mut pthread_once_t, init_routine: Option<unsafe extern "C" fn()>) -> c_int {
        status((|| -> Result<()> {
            let once = obj(once_control)?;
            let routine = init_routine.ok_or(PthreadError::InvalidArgument)?;
            // SAFETY: the caller vouches for `init_routine`.
            once.once.call_once(|| unsafe { routine() });
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_cleanup_push(routine: Option<CleanupRoutine>, arg: *mut c_void) {
        if let Some(routine) = routine {
            // SAFETY: the caller vouches for `routine` and `arg`.
            cleanup::push_handler(move || unsafe { routine(arg) });
        }
    }
}

abi_fn! {
    fn pthread_cleanup_pop(execute: c_int) {
        cleanup::pop_handler(execute != 0);
    }
}
