//! Shared internal utilities for ABI adapters.

use std::ffi::c_int;

use hostpthread_core::error::{self, PthreadError, Result};

/// Converts a core result into a POSIX status (0 or an errno value).
#[inline]
pub(crate) fn status(result: Result<()>) -> c_int {
    error::status(result)
}

/// Borrows a caller object, `InvalidArgument` for null.
///
/// # Safety
///
/// A non-null `ptr` must point to a valid, live `T` for `'a`.
pub(crate) unsafe fn obj<'a, T>(ptr: *const T) -> Result<&'a T> {
    // SAFETY: caller contract.
    unsafe { ptr.as_ref() }.ok_or(PthreadError::InvalidArgument)
}

/// Mutable counterpart of [`obj`].
///
/// # Safety
///
/// A non-null `ptr` must point to a valid `T` not aliased for `'a`.
pub(crate) unsafe fn obj_mut<'a, T>(ptr: *mut T) -> Result<&'a mut T> {
    // SAFETY: caller contract.
    unsafe { ptr.as_mut() }.ok_or(PthreadError::InvalidArgument)
}

/// Writes a required output parameter. Callers compute `value` first so
/// nothing is written on failure.
///
/// # Safety
///
/// A non-null `out` must be valid for writes.
pub(crate) unsafe fn put<T>(out: *mut T, value: T) -> Result<()> {
    if out.is_null() {
        return Err(PthreadError::InvalidArgument);
    }
    // SAFETY: non-null; validity is the caller's contract.
    unsafe { out.write(value) };
    Ok(())
}

/// Writes an optional output parameter; null is skipped.
///
/// # Safety
///
/// A non-null `out` must be valid for writes.
pub(crate) unsafe fn put_opt<T>(out: *mut T, value: T) {
    if !out.is_null() {
        // SAFETY: non-null; validity is the caller's contract.
        unsafe { out.write(value) };
    }
}
