//! # hostpthread-core
//!
//! POSIX thread semantics emulated on top of host synchronization primitives.
//!
//! This crate holds the emulation engine: the lazy three-state initialization
//! protocol shared by every primitive, mutexes, condition variables,
//! reader-writer locks with per-thread mode tracking, barriers, the
//! thread-local key registry, and the thread lifecycle with cooperative
//! cancellation and cleanup-handler unwinding. The `extern "C"` surface lives
//! in `hostpthread-abi`.
//!
//! Only the modules that must touch raw storage opt back into `unsafe`.

#![deny(unsafe_code)]

pub mod config;
pub mod errno;
pub mod error;
pub mod log;
pub mod pthread;

pub use error::{PthreadError, Result};
