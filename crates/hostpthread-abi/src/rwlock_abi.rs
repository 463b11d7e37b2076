//! ABI layer for `pthread_rwlock_*`.

use std::ffi::c_int;

use hostpthread_core::error::Result;
use hostpthread_core::pthread::{RwLock, RwLockAttr};

use crate::macros::abi_fn;
use crate::types::{pthread_rwlock_t, pthread_rwlockattr_t};
use crate::util::{obj, status};

unsafe fn core_rwlock<'a>(rwlock: *mut pthread_rwlock_t) -> Result<&'a RwLock> {
    // SAFETY: caller contract.
    unsafe { obj(rwlock) }?.get()
}

abi_fn! {
    fn pthread_rwlock_init(rwlock: *mut pthread_rwlock_t, attr: *const pthread_rwlockattr_t) -> c_int {
        status((|| -> Result<()> {
            let l = obj(rwlock)?;
            let attr: Option<RwLockAttr> = if attr.is_null() {
                None
            } else {
                Some(*obj(attr)?.get()?)
            };
            l.raw().init(attr.as_ref())?;
            l.mark_live();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_rwlock_destroy(rwlock: *mut pthread_rwlock_t) -> c_int {
        status((|| -> Result<()> {
            let l = obj(rwlock)?;
            // SAFETY: racing destroy against use is the caller's contract.
            l.get()?.destroy()?;
            l.mark_dead();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_rwlock_rdlock(rwlock: *mut pthread_rwlock_t) -> c_int {
        status(core_rwlock(rwlock).and_then(RwLock::read_lock))
    }
}

abi_fn! {
    fn pthread_rwlock_tryrdlock(rwlock: *mut pthread_rwlock_t) -> c_int {
        status(core_rwlock(rwlock).and_then(RwLock::try_read_lock))
    }
}

abi_fn! {
    fn pthread_rwlock_wrlock(rwlock: *mut pthread_rwlock_t) -> c_int {
        status(core_rwlock(rwlock).and_then(RwLock::write_lock))
    }
}

abi_fn! {
    fn pthread_rwlock_trywrlock(rwlock: *mut pthread_rwlock_t) -> c_int {
        status(core_rwlock(rwlock).and_then(RwLock::try_write_lock))
    }
}

abi_fn! {
    fn pthread_rwlock_unlock(rwlock: *mut pthread_rwlock_t) -> c_int {
        status(core_rwlock(rwlock).and_then(RwLock::unlock))
    }
}
