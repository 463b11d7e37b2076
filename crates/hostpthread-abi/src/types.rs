//! C-visible storage for every `<pthread.h>` object.
//!
//! Each object is a `#[repr(C)]` record led by a signature word followed by
//! the core object. All-zero storage is a valid, unconstructed object (the
//! static initializer). A signature other than zero or the type's tag means
//! the storage never held this kind of object and is rejected with `EINVAL`.

#![allow(non_camel_case_types)]
#![allow(clippy::declare_interior_mutable_const)]

use std::ffi::{c_uint, c_ulong};
use std::sync::atomic::{AtomicU32, Ordering};

use hostpthread_core::error::{PthreadError, Result};
use hostpthread_core::pthread::{
    Barrier, BarrierAttr, Cond, CondAttr, Mutex, MutexAttr, Once, RwLock, RwLockAttr, ThreadAttr,
};

pub type pthread_t = c_ulong;
pub type pthread_key_t = c_uint;

pub(crate) const ATTR_SIG: u32 = 0x5441_5454; // "TTAT"
pub(crate) const MUTEXATTR_SIG: u32 = 0x414d_5854; // "TXMA"
pub(crate) const CONDATTR_SIG: u32 = 0x4143_4e44; // "DNCA"
pub(crate) const RWLOCKATTR_SIG: u32 = 0x4157_5252; // "RRWA"
pub(crate) const BARRIERATTR_SIG: u32 = 0x4142_5242; // "BRBA"
pub(crate) const MUTEX_SIG: u32 = 0x5854_4d58; // "XMTX"
pub(crate) const COND_SIG: u32 = 0x444e_4f43; // "COND"
pub(crate) const RWLOCK_SIG: u32 = 0x4b4c_5752; // "RWLK"
pub(crate) const BARRIER_SIG: u32 = 0x5242_5242; // "BRBR"

/// Signature word of a synchronization object.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct Sig(AtomicU32);

impl Sig {
    const fn zero() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Accepts zeroed storage or a matching tag.
    fn check(&self, tag: u32) -> Result<()> {
        match self.0.load(Ordering::Acquire) {
            0 => Ok(()),
            s if s == tag => Ok(()),
            _ => Err(PthreadError::InvalidArgument),
        }
    }

    fn set(&self, tag: u32) {
        self.0.store(tag, Ordering::Release);
    }

    fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

macro_rules! sync_object {
    ($(#[$meta:meta])* $name:ident, $field:ident: $ty:ty, $tag:expr, $init:ident) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Default)]
        pub struct $name {
            sig: Sig,
            $field: $ty,
        }

        impl $name {
            pub const INITIALIZER: Self = Self {
                sig: Sig::zero(),
                $field: <$ty>::new(),
            };

            /// The core object, unless the storage carries a foreign signature.
            pub(crate) fn get(&self) -> Result<&$ty> {
                self.sig.check($tag)?;
                Ok(&self.$field)
            }

            /// The core object regardless of the signature, for `*_init` on
            /// never-used storage.
            pub(crate) fn raw(&self) -> &$ty {
                &self.$field
            }

            pub(crate) fn mark_live(&self) {
                self.sig.set($tag);
            }

            pub(crate) fn mark_dead(&self) {
                self.sig.clear();
            }
        }

        pub const $init: $name = $name::INITIALIZER;
    };
}

sync_object!(pthread_mutex_t, mutex: Mutex, MUTEX_SIG, PTHREAD_MUTEX_INITIALIZER);
sync_object!(pthread_cond_t, cond: Cond, COND_SIG, PTHREAD_COND_INITIALIZER);
sync_object!(pthread_rwlock_t, rwlock: RwLock, RWLOCK_SIG, PTHREAD_RWLOCK_INITIALIZER);
sync_object!(
    /// Barriers have no static initializer in C; the constant is the zeroed
    /// state `pthread_barrier_init` expects.
    pthread_barrier_t,
    barrier: Barrier,
    BARRIER_SIG,
    PTHREAD_BARRIER_ZEROED
);

/// `pthread_once_t`.
#[repr(C)]
#[derive(Debug, Default)]
pub struct pthread_once_t {
    pub(crate) once: Once,
}

pub const PTHREAD_ONCE_INIT: pthread_once_t = pthread_once_t { once: Once::new() };

macro_rules! attr_object {
    ($name:ident, $ty:ty, $tag:expr) => {
        #[repr(C)]
        #[derive(Debug)]
        pub struct $name {
            sig: u32,
            attr: $ty,
        }

        impl Default for $name {
            /// Uninitialized storage: every accessor fails until `*_init`.
            fn default() -> Self {
                Self {
                    sig: 0,
                    attr: <$ty>::default(),
                }
            }
        }

        impl $name {
            /// Freshly initialized attributes, written whole over the
            /// caller's storage.
            pub(crate) fn initialized() -> Self {
                Self {
                    sig: $tag,
                    attr: <$ty>::default(),
                }
            }

            pub(crate) fn destroy(&mut self) -> Result<()> {
                self.get()?;
                self.sig = 0;
                Ok(())
            }

            /// `InvalidArgument` unless initialized.
            pub(crate) fn get(&self) -> Result<&$ty> {
                if self.sig == $tag {
                    Ok(&self.attr)
                } else {
                    Err(PthreadError::InvalidArgument)
                }
            }

            pub(crate) fn get_mut(&mut self) -> Result<&mut $ty> {
                if self.sig == $tag {
                    Ok(&mut self.attr)
                } else {
                    Err(PthreadError::InvalidArgument)
                }
            }
        }
    };
}

attr_object!(pthread_attr_t, ThreadAttr, ATTR_SIG);
attr_object!(pthread_mutexattr_t, MutexAttr, MUTEXATTR_SIG);
attr_object!(pthread_condattr_t, CondAttr, CONDATTR_SIG);
attr_object!(pthread_rwlockattr_t, RwLockAttr, RWLOCKATTR_SIG);
attr_object!(pthread_barrierattr_t, BarrierAttr, BARRIERATTR_SIG);
