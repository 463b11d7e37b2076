//! ABI layer for `pthread_barrier_*`.

use std::ffi::{c_int, c_uint};

use hostpthread_core::error::Result;
use hostpthread_core::pthread::BarrierAttr;

use crate::macros::abi_fn;
use crate::types::{pthread_barrier_t, pthread_barrierattr_t};
use crate::util::{obj, status};

abi_fn! {
    fn pthread_barrier_init(
        barrier: *mut pthread_barrier_t,
        attr: *const pthread_barrierattr_t,
        count: c_uint,
    ) -> c_int {
        status((|| -> Result<()> {
            let b = obj(barrier)?;
            let attr: Option<BarrierAttr> = if attr.is_null() {
                None
            } else {
                Some(*obj(attr)?.get()?)
            };
            b.raw().init(attr.as_ref(), count)?;
            b.mark_live();
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_barrier_destroy(barrier: *mut pthread_barrier_t) -> c_int {
        status((|| -> Result<()> {
            let b = obj(barrier)?;
            // SAFETY: destroying with waiters present is the caller's contract.
            b.get()?.destroy()?;
            b.mark_dead();
            Ok(())
        })())
    }
}

abi_fn! {
    /// `PTHREAD_BARRIER_SERIAL_THREAD` for one arrival per round, 0 for the
    /// rest, or an errno value.
    fn pthread_barrier_wait(barrier: *mut pthread_barrier_t) -> c_int {
        match obj(barrier).and_then(|b| b.get()).and_then(|b| b.wait()) {
            Ok(r) => r.as_raw(),
            Err(e) => e.errno(),
        }
    }
}
