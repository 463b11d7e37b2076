//! ABI layer for `pthread_mutex_*`.

use std::ffi::c_int;

use hostpthread_core::error::Result;
use hostpthread_core::pthread::{Mutex, MutexAttr};

use crate::macros::abi_fn;
use crate::types::{pthread_mutex_t, pthread_mutexattr_t};
use crate::util::{obj, put, put_opt, status};

/// Core mutex behind a caller pointer.
///
/// # Safety
///
/// A non-null `mutex` must point to valid `pthread_mutex_t` storage.
pub(crate) unsafe fn core_mutex<'a>(mutex: *mut pthread_mutex_t) -> Result<&'a Mutex> {
    // SAFETY: caller contract.
    unsafe { obj(mutex) }?.get()
}

abi_fn! {
    fn pthread_mutex_init(mutex: *mut pthread_mutex_t, attr: *const pthread_mutexattr_t) -> c_int {
        status((|| -> Result<()> {
            let m = obj(mutex)?;
            let attr: Option<MutexAttr> = if attr.is_null() {
                None
            } else {
                Some(*obj(attr)?.get()?)
            };
            m.raw().init(attr.as_ref())?;
            m.mark_live();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_mutex_destroy(mutex: *mut pthread_mutex_t) -> c_int {
        status((|| -> Result<()> {
            let m = obj(mutex)?;
            // SAFETY: racing destroy against use is the caller's contract.
            m.get()?.destroy()?;
            m.mark_dead();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_mutex_lock(mutex: *mut pthread_mutex_t) -> c_int {
        status(core_mutex(mutex).and_then(Mutex::lock))
    }
}

abi_fn! {
    fn pthread_mutex_trylock(mutex: *mut pthread_mutex_t) -> c_int {
        status(core_mutex(mutex).and_then(Mutex::try_lock))
    }
}

abi_fn! {
    fn pthread_mutex_unlock(mutex: *mut pthread_mutex_t) -> c_int {
        status(core_mutex(mutex).and_then(Mutex::unlock))
    }
}

abi_fn! {
    fn pthread_mutex_getprioceiling(mutex: *const pthread_mutex_t, ceiling: *mut c_int) -> c_int {
        status((|| -> Result<()> {
            let value = core_mutex(mutex.cast_mut())?.prio_ceiling()?;
            put(ceiling, value)
        })())
    }
}

abi_fn! {
    fn pthread_mutex_setprioceiling(
        mutex: *mut pthread_mutex_t,
        ceiling: c_int,
        old_ceiling: *mut c_int,
    ) -> c_int {
        status((|| -> Result<()> {
            let old = core_mutex(mutex)?.set_prio_ceiling(ceiling)?;
            put_opt(old_ceiling, old);
            Ok(())
        })())
    }
}
