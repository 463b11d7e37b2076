//! POSIX threads.
//!
//! Thread management, mutexes, condition variables, reader-writer locks,
//! barriers, one-time initialization, cleanup handlers, and thread-local
//! keys, all emulated on in-process host primitives.

pub mod attr;
#[allow(unsafe_code)]
pub mod barrier;
pub mod cleanup;
#[allow(unsafe_code)]
pub mod cond;
pub mod host;
#[allow(unsafe_code)]
pub mod lazy;
mod local;
#[allow(unsafe_code)]
pub mod mutex;
pub mod once;
#[allow(unsafe_code)]
pub mod rwlock;
pub mod thread;
pub mod tls;

pub use attr::{
    BarrierAttr, CancelState, CancelType, CondAttr, DetachState, InheritSched, MutexAttr,
    MutexType, PShared, Protocol, RwLockAttr, SchedParam, Scope, ThreadAttr, PTHREAD_CANCELED,
};
pub use barrier::{Barrier, BarrierWaitResult};
pub use cleanup::{cleanup_push, CleanupGuard};
pub use cond::{Cond, Timespec};
pub use lazy::LazyState;
pub use mutex::Mutex;
pub use once::Once;
pub use rwlock::RwLock;
pub use thread::{
    create, current, equal, exit, set_cancel_state, set_cancel_type, test_cancel, ExitStatus,
    Phase, Thread,
};
pub use tls::{get_specific, key_create, key_delete, set_specific, Destructor, Key};
