//! ABI layer for attribute objects: thread, mutex, condvar, rwlock, and
//! barrier attributes.
//!
//! `*_init` writes the whole object; every other accessor fails with
//! `EINVAL` on storage that was never initialized or was destroyed.

use std::ffi::{c_int, c_void};

use hostpthread_core::error::{PthreadError, Result};
use hostpthread_core::pthread::{DetachState, InheritSched, MutexType, PShared, Protocol, Scope};

use crate::macros::abi_fn;
use crate::types::{
    pthread_attr_t, pthread_barrierattr_t, pthread_condattr_t, pthread_mutexattr_t,
    pthread_rwlockattr_t,
};
use crate::util::{obj, obj_mut, put, status};

// ---------------------------------------------------------------------------
// Thread attributes
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_attr_init(attr: *mut pthread_attr_t) -> c_int {
        status(put(attr, pthread_attr_t::initialized()))
    }
}

abi_fn! {
    fn pthread_attr_destroy(attr: *mut pthread_attr_t) -> c_int {
        status(obj_mut(attr).and_then(pthread_attr_t::destroy))
    }
}

abi_fn! {
    fn pthread_attr_getdetachstate(attr: *const pthread_attr_t, state: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(state, a.detach_state().as_raw())))
    }
}

abi_fn! {
    fn pthread_attr_setdetachstate(attr: *mut pthread_attr_t, state: c_int) -> c_int {
        status((|| -> Result<()> {
            let state = DetachState::from_raw(state)?;
            obj_mut(attr)?.get_mut()?.set_detach_state(state);
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_attr_getguardsize(attr: *const pthread_attr_t, size: *mut usize) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(size, a.guard_size())))
    }
}

abi_fn! {
    fn pthread_attr_setguardsize(attr: *mut pthread_attr_t, size: usize) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).map(|a| a.set_guard_size(size)))
    }
}

abi_fn! {
    fn pthread_attr_getinheritsched(attr: *const pthread_attr_t, inherit: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(inherit, a.inherit_sched().as_raw())))
    }
}

abi_fn! {
    fn pthread_attr_setinheritsched(attr: *mut pthread_attr_t, inherit: c_int) -> c_int {
        status((|| -> Result<()> {
            let inherit = InheritSched::from_raw(inherit)?;
            obj_mut(attr)?.get_mut()?.set_inherit_sched(inherit);
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_attr_getschedparam(
        attr: *const pthread_attr_t,
        param: *mut libc::sched_param,
    ) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| {
            put(param, libc::sched_param { sched_priority: a.sched_param().priority })
        }))
    }
}

abi_fn! {
    fn pthread_attr_setschedparam(
        attr: *mut pthread_attr_t,
        param: *const libc::sched_param,
    ) -> c_int {
        status((|| -> Result<()> {
            let priority = obj(param)?.sched_priority;
            obj_mut(attr)?.get_mut()?.set_sched_priority(priority)
        })())
    }
}

abi_fn! {
    fn pthread_attr_getschedpolicy(attr: *const pthread_attr_t, policy: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(policy, a.sched_param().policy)))
    }
}

abi_fn! {
    fn pthread_attr_setschedpolicy(attr: *mut pthread_attr_t, policy: c_int) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).and_then(|a| a.set_sched_policy(policy)))
    }
}

abi_fn! {
    fn pthread_attr_getscope(attr: *const pthread_attr_t, scope: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(scope, a.scope().as_raw())))
    }
}

abi_fn! {
    fn pthread_attr_setscope(attr: *mut pthread_attr_t, scope: c_int) -> c_int {
        status((|| -> Result<()> {
            let scope = Scope::from_raw(scope)?;
            obj_mut(attr)?.get_mut()?.set_scope(scope)
        })())
    }
}

abi_fn! {
    fn pthread_attr_getstack(
        attr: *const pthread_attr_t,
        addr: *mut *mut c_void,
        size: *mut usize,
    ) -> c_int {
        status((|| -> Result<()> {
            let a = obj(attr)?.get()?;
            if addr.is_null() || size.is_null() {
                return Err(PthreadError::InvalidArgument);
            }
            put(addr, std::ptr::null_mut())?;
            put(size, a.stack_size())
        })())
    }
}

abi_fn! {
    fn pthread_attr_setstack(attr: *mut pthread_attr_t, addr: *mut c_void, size: usize) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).and_then(|a| a.set_stack(addr as usize, size)))
    }
}

abi_fn! {
    fn pthread_attr_getstackaddr(attr: *const pthread_attr_t, addr: *mut *mut c_void) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|_| put(addr, std::ptr::null_mut())))
    }
}

abi_fn! {
    fn pthread_attr_setstackaddr(attr: *mut pthread_attr_t, addr: *mut c_void) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).and_then(|a| a.set_stack_addr(addr as usize)))
    }
}

abi_fn! {
    fn pthread_attr_getstacksize(attr: *const pthread_attr_t, size: *mut usize) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(size, a.stack_size())))
    }
}

abi_fn! {
    fn pthread_attr_setstacksize(attr: *mut pthread_attr_t, size: usize) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).and_then(|a| a.set_stack_size(size)))
    }
}

// ---------------------------------------------------------------------------
// Mutex attributes
// ---------------------------------------------------------------------------

abi_fn! {
    fn pthread_mutexattr_init(attr: *mut pthread_mutexattr_t) -> c_int {
        status(put(attr, pthread_mutexattr_t::initialized()))
    }
}

abi_fn! {
    fn pthread_mutexattr_destroy(attr: *mut pthread_mutexattr_t) -> c_int {
        status(obj_mut(attr).and_then(pthread_mutexattr_t::destroy))
    }
}

abi_fn! {
    fn pthread_mutexattr_getprioceiling(attr: *const pthread_mutexattr_t, ceiling: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(ceiling, a.prio_ceiling)))
    }
}

abi_fn! {
    fn pthread_mutexattr_setprioceiling(attr: *mut pthread_mutexattr_t, ceiling: c_int) -> c_int {
        status(obj_mut(attr).and_then(|a| a.get_mut()).map(|a| a.prio_ceiling = ceiling))
    }
}

abi_fn! {
    fn pthread_mutexattr_getprotocol(attr: *const pthread_mutexattr_t, protocol: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(protocol, a.protocol.as_raw())))
    }
}

abi_fn! {
    fn pthread_mutexattr_setprotocol(attr: *mut pthread_mutexattr_t, protocol: c_int) -> c_int {
        status((|| -> Result<()> {
            let protocol = Protocol::from_raw(protocol)?;
            obj_mut(attr)?.get_mut()?.protocol = protocol;
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_mutexattr_getpshared(attr: *const pthread_mutexattr_t, pshared: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(pshared, a.pshared.as_raw())))
    }
}

abi_fn! {
    fn pthread_mutexattr_setpshared(attr: *mut pthread_mutexattr_t, pshared: c_int) -> c_int {
        status((|| -> Result<()> {
            let pshared = PShared::from_raw(pshared)?;
            obj_mut(attr)?.get_mut()?.pshared = pshared;
            Ok(())
        })())
    }
}

abi_fn! {
    fn pthread_mutexattr_gettype(attr: *const pthread_mutexattr_t, kind: *mut c_int) -> c_int {
        status(obj(attr).and_then(|a| a.get()).and_then(|a| put(kind, a.kind.as_raw())))
    }
}

abi_fn! {
    fn pthread_mutexattr_settype(attr: *mut pthread_mutexattr_t, kind: c_int) -> c_int {
        status((|| -> Result<()> {
            let kind = MutexType::from_raw(kind)?;
            obj_mut(attr)?.get_mut()?.kind = kind;
            Ok(())
        })())
    }
}

// ---------------------------------------------------------------------------
// Condvar, rwlock, and barrier attributes (pshared only)
// ---------------------------------------------------------------------------

macro_rules! pshared_attr_abi {
    ($ty:ty, $init:ident, $destroy:ident, $get:ident, $set:ident) => {
        abi_fn! {
            fn $init(attr: *mut $ty) -> c_int {
                status(put(attr, <$ty>::initialized()))
            }
        }

        abi_fn! {
            fn $destroy(attr: *mut $ty) -> c_int {
                status(obj_mut(attr).and_then(<$ty>::destroy))
            }
        }

        abi_fn! {
            fn $get(attr: *const $ty, pshared: *mut c_int) -> c_int {
                status(obj(attr).and_then(|a| a.get()).and_then(|a| put(pshared, a.pshared.as_raw())))
            }
        }

        abi_fn! {
            fn $set(attr: *mut $ty, pshared: c_int) -> c_int {
                status((|| -> Result<()> {
                    let pshared = PShared::from_raw(pshared)?;
                    obj_mut(attr)?.get_mut()?.pshared = pshared;
                    Ok(())
                })())
            }
        }
    };
}

pshared_attr_abi!(
    pthread_condattr_t,
    pthread_condattr_init,
    pthread_condattr_destroy,
    pthread_condattr_getpshared,
    pthread_condattr_setpshared
);
pshared_attr_abi!(
    pthread_rwlockattr_t,
    pthread_rwlockattr_init,
    pthread_rwlockattr_destroy,
    pthread_rwlockattr_getpshared,
    pthread_rwlockattr_setpshared
);
pshared_attr_abi!(
    pthread_barrierattr_t,
    pthread_barrierattr_init,
    pthread_barrierattr_destroy,
    pthread_barrierattr_getpshared,
    pthread_barrierattr_setpshared
);
