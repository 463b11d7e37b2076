//! ABI layer for `pthread_key_*` and `pthread_{get,set}specific`.

use std::ffi::{c_int, c_void};

use hostpthread_core::error::{PthreadError, Result};
use hostpthread_core::pthread::{Key, tls};

use crate::macros::abi_fn;
use crate::types::pthread_key_t;
use crate::util::{put, status};

/// C key destructor.
pub type KeyDestructor = unsafe extern "C" fn(*mut c_void);

fn key(raw: pthread_key_t) -> Result<Key> {
    Key::from_raw(raw).ok_or(PthreadError::InvalidArgument)
}

abi_fn! {
    fn pthread_key_create(key_out: *mut pthread_key_t, destructor: Option<KeyDestructor>) -> c_int {
        status((|| -> Result<()> {
            if key_out.is_null() {
                return Err(PthreadError::InvalidArgument);
            }
            let dtor: Option<tls::Destructor> = destructor.map(|d| {
                // SAFETY: the creator vouches for `d`.
                Box::new(move |value: usize| unsafe { d(value as *mut c_void) }) as tls::Destructor
            });
            let k = tls::key_create(dtor)?;
            put(key_out, k.as_raw())
        })())
    }
}

abi_fn! {
    fn pthread_key_delete(k: pthread_key_t) -> c_int {
        status(key(k).and_then(tls::key_delete))
    }
}

abi_fn! {
    fn pthread_getspecific(k: pthread_key_t) -> *mut c_void {
        key(k).map_or(0, tls::get_specific) as *mut c_void
    }
}

abi_fn! {
    fn pthread_setspecific(k: pthread_key_t, value: *const c_void) -> c_int {
        status(key(k).and_then(|k| tls::set_specific(k, value as usize)))
    }
}
