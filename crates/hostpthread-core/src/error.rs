//! Error taxonomy for the threading surface.
//!
//! Every fallible operation returns a [`PthreadError`] directly to its caller.
//! The C boundary flattens it to an errno value with [`PthreadError::errno`].

use thiserror::Error;

use crate::errno;

/// Failure conditions reported by the emulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum PthreadError {
    /// Bad handle, dead object, out-of-range attribute, or unsupported value.
    #[error("invalid argument")]
    InvalidArgument,
    /// Accepted syntactically but not implementable on the host.
    #[error("operation not supported")]
    NotSupported,
    /// Host primitive, TLS slot, or nesting-depth exhaustion.
    #[error("resource temporarily unavailable")]
    ResourceExhausted,
    /// A non-blocking acquire lost the race, or the object is still held.
    #[error("resource busy")]
    Busy,
    /// Handle does not name a live thread.
    #[error("no such thread")]
    NoSuchThread,
    /// A timed wait passed its deadline.
    #[error("timed out")]
    TimedOut,
    /// The host ended a blocking wait without a usable result.
    #[error("interrupted")]
    Interrupted,
    /// The caller does not own the lock it tried to release.
    #[error("operation not permitted")]
    NotPermitted,
    /// The operation would wait on the calling thread itself.
    #[error("resource deadlock would occur")]
    Deadlock,
}

impl PthreadError {
    /// POSIX errno value for this condition.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument => errno::EINVAL,
            Self::NotSupported => errno::ENOTSUP,
            Self::ResourceExhausted => errno::EAGAIN,
            Self::Busy => errno::EBUSY,
            Self::NoSuchThread => errno::ESRCH,
            Self::TimedOut => errno::ETIMEDOUT,
            Self::Interrupted => errno::EINTR,
            Self::NotPermitted => errno::EPERM,
            Self::Deadlock => errno::EDEADLK,
        }
    }

    /// Inverse of [`PthreadError::errno`]; `None` for success or unknown codes.
    #[must_use]
    pub const fn from_errno(code: i32) -> Option<Self> {
        match code {
            errno::EINVAL => Some(Self::InvalidArgument),
            errno::ENOTSUP => Some(Self::NotSupported),
            errno::EAGAIN => Some(Self::ResourceExhausted),
            errno::EBUSY => Some(Self::Busy),
            errno::ESRCH => Some(Self::NoSuchThread),
            errno::ETIMEDOUT => Some(Self::TimedOut),
            errno::EINTR => Some(Self::Interrupted),
            errno::EPERM => Some(Self::NotPermitted),
            errno::EDEADLK => Some(Self::Deadlock),
            _ => None,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, PthreadError>;

/// Flattens a result into a POSIX status code (0 on success).
#[must_use]
pub fn status<T>(result: Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.errno(),
    }
}
