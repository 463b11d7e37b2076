//! ABI layer for `pthread_cond_*`.

use std::ffi::c_int;

use hostpthread_core::error::Result;
use hostpthread_core::pthread::{Cond, CondAttr, Timespec};

use crate::macros::abi_fn;
use crate::mutex_abi::core_mutex;
use crate::types::{pthread_cond_t, pthread_condattr_t, pthread_mutex_t};
use crate::util::{obj, status};

unsafe fn core_cond<'a>(cond: *mut pthread_cond_t) -> Result<&'a Cond> {
    // SAFETY: caller contract.
    unsafe { obj(cond) }?.get()
}

abi_fn! {
    fn pthread_cond_init(cond: *mut pthread_cond_t, attr: *const pthread_condattr_t) -> c_int {
        status((|| -> Result<()> {
            let c = obj(cond)?;
            let attr: Option<CondAttr> = if attr.is_null() {
                None
            } else {
                Some(*obj(attr)?.get()?)
            };
            c.raw().init(attr.as_ref())?;
            c.mark_live();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_cond_destroy(cond: *mut pthread_cond_t) -> c_int {
        status((|| -> Result<()> {
            let c = obj(cond)?;
            // SAFETY: destroying with waiters present is the caller's contract.
            c.get()?.destroy()?;
            c.mark_dead();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_cond_signal(cond: *mut pthread_cond_t) -> c_int {
        status(core_cond(cond).map(Cond::signal))
    }
}

abi_fn! {
    fn pthread_cond_broadcast(cond: *mut pthread_cond_t) -> c_int {
        status(core_cond(cond).map(Cond::broadcast))
    }
}

abi_fn! {
    fn pthread_cond_wait(cond: *mut pthread_cond_t, mutex: *mut pthread_mutex_t) -> c_int {
        status((|| -> Result<()> {
            let m = core_mutex(mutex)?;
            core_cond(cond)?.wait(m)
        })())
    }
}

abi_fn! {
    fn pthread_cond_timedwait(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const libc::timespec,
    ) -> c_int {
        status((|| -> Result<()> {
            let ts = obj(abstime)?;
            let deadline = Timespec::new(i64::from(ts.tv_sec), i64::from(ts.tv_nsec));
            let m = core_mutex(mutex)?;
            core_cond(cond)?.timed_wait(m, deadline)
        })())
    }
}
