// Every extern "C" entry accepts raw pointers from C callers and checks them
// for null; per-function safety docs would repeat the POSIX contract.
#![allow(clippy::missing_safety_doc)]
//! # hostpthread-abi
//!
//! `extern "C"` boundary for hostpthread: the `<pthread.h>` surface,
//! signature-for-signature, over the engine in `hostpthread-core`.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> core operation -> errno status
//! ```
//!
//! Every entry returns 0 or an errno value and writes no output parameter on
//! failure. With the `export-symbols` feature the POSIX names are exported
//! unmangled, so the `cdylib` can stand in for the host's pthread symbols;
//! without it they are ordinary Rust functions.

mod macros;

pub mod attr_abi;
pub mod barrier_abi;
pub mod cond_abi;
pub mod key_abi;
pub mod mutex_abi;
pub mod rwlock_abi;
pub mod thread_abi;
pub mod types;
mod util;

pub use hostpthread_core::pthread::attr::{
    PTHREAD_BARRIER_SERIAL_THREAD, PTHREAD_CANCEL_ASYNCHRONOUS, PTHREAD_CANCEL_DEFERRED,
    PTHREAD_CANCEL_DISABLE, PTHREAD_CANCEL_ENABLE, PTHREAD_CANCELED, PTHREAD_CREATE_DETACHED,
    PTHREAD_CREATE_JOINABLE, PTHREAD_EXPLICIT_SCHED, PTHREAD_INHERIT_SCHED,
    PTHREAD_MUTEX_DEFAULT, PTHREAD_MUTEX_ERRORCHECK, PTHREAD_MUTEX_NORMAL,
    PTHREAD_MUTEX_RECURSIVE, PTHREAD_PRIO_INHERIT, PTHREAD_PRIO_NONE, PTHREAD_PRIO_PROTECT,
    PTHREAD_PROCESS_PRIVATE, PTHREAD_PROCESS_SHARED, PTHREAD_SCOPE_PROCESS,
    PTHREAD_SCOPE_SYSTEM, PTHREAD_STACK_MIN, SCHED_BATCH, SCHED_FIFO, SCHED_IDLE, SCHED_OTHER,
    SCHED_RESET_ON_FORK, SCHED_RR,
};
pub use hostpthread_core::pthread::tls::PTHREAD_KEYS_MAX;
pub use types::{
    PTHREAD_BARRIER_ZEROED, PTHREAD_COND_INITIALIZER, PTHREAD_MUTEX_INITIALIZER,
    PTHREAD_ONCE_INIT, PTHREAD_RWLOCK_INITIALIZER,
};
