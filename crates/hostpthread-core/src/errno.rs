//! Error number definitions.
//!
//! The subset of `<errno.h>` values the threading surface reports. Numbering
//! follows Linux so status codes compare equal to `libc::E*` on that host.

/// Well-known errno constants.
pub const EPERM: i32 = 1;
pub const ESRCH: i32 = 3;
pub const EINTR: i32 = 4;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const EDEADLK: i32 = 35;
pub const ENOTSUP: i32 = 95;
pub const ETIMEDOUT: i32 = 110;

/// Returns the symbolic name of a status code, `"0"` for success.
#[must_use]
pub const fn errno_name(code: i32) -> &'static str {
    match code {
        0 => "0",
        EPERM => "EPERM",
        ESRCH => "ESRCH",
        EINTR => "EINTR",
        EAGAIN => "EAGAIN",
        ENOMEM => "ENOMEM",
        EBUSY => "EBUSY",
        EINVAL => "EINVAL",
        EDEADLK => "EDEADLK",
        ENOTSUP => "ENOTSUP",
        ETIMEDOUT => "ETIMEDOUT",
        _ => "EUNKNOWN",
    }
}
