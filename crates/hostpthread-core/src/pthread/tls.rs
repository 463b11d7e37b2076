//! Thread-local key registry.
//!
//! Implements `pthread_key_create`, `pthread_key_delete`,
//! `pthread_getspecific`, and `pthread_setspecific` on top of host TLS slots.
//!
//! ## Design
//!
//! - **Registry**: one table of `PTHREAD_KEYS_MAX` entries behind one lock.
//!   Each entry tracks in-use state, the optional destructor, and the host
//!   slot backing the key. The slot's generation changes on every
//!   allocation, so it doubles as the stale-handle check.
//! - **Values**: stored in the calling thread's host slot. `get`/`set` only
//!   read a lock-free mirror of the key's slot, never the registry lock, so
//!   destructors may call them while dispatch holds the lock.
//! - **Exit dispatch**: a single pass under the registry lock. Each non-null
//!   value of a key with a destructor is cleared, then the destructor runs
//!   once with it. Destructors must not create or delete keys.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::host::TlsSlot;
use super::local;

/// Maximum number of keys alive at once.
pub const PTHREAD_KEYS_MAX: usize = 1024;

/// Destructor invoked with a thread's non-null value at thread exit.
pub type Destructor = Box<dyn Fn(usize) + Send + Sync>;

/// Handle returned by [`key_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    index: u32,
    slot: TlsSlot,
}

impl Key {
    /// Registry index, the `pthread_key_t` value at the C boundary.
    #[must_use]
    pub fn as_raw(self) -> u32 {
        self.index
    }

    /// Resolves a raw key index without taking the registry lock.
    #[must_use]
    pub fn from_raw(index: u32) -> Option<Self> {
        let bits = MIRROR.get(index as usize)?.load(Ordering::Acquire);
        let slot = TlsSlot::from_bits(bits)?;
        Some(Self { index, slot })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct KeySlot {
    in_use: bool,
    destructor: Option<Destructor>,
    slot: Option<TlsSlot>,
}

impl fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySlot")
            .field("in_use", &self.in_use)
            .field("has_destructor", &self.destructor.is_some())
            .field("slot", &self.slot)
            .finish()
    }
}

#[derive(Debug)]
struct Registry {
    slots: Vec<KeySlot>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry { slots: Vec::new() });

// Lock-free view of each live key's host slot (`TlsSlot::to_bits`).
// Zero means no live key at that index.
static MIRROR: [AtomicU64; PTHREAD_KEYS_MAX] = [const { AtomicU64::new(0) }; PTHREAD_KEYS_MAX];

/// Allocates a key, optionally with a destructor.
///
/// `ResourceExhausted` when the registry or the host slot table is full.
pub fn key_create(destructor: Option<Destructor>) -> Result<Key> {
    let mut reg = REGISTRY.lock();
    let index = match reg.slots.iter().position(|s| !s.in_use) {
        Some(i) => i,
        None if reg.slots.len() < PTHREAD_KEYS_MAX => {
            reg.slots.push(KeySlot::default());
            reg.slots.len() - 1
        }
        None => return Err(PthreadError::ResourceExhausted),
    };
    let slot = TlsSlot::alloc()?;
    let entry = &mut reg.slots[index];
    entry.in_use = true;
    entry.destructor = destructor;
    entry.slot = Some(slot);
    let key = Key {
        index: index as u32,
        slot,
    };
    MIRROR[index].store(slot.to_bits(), Ordering::Release);
    log::record(LogLevel::Debug, "key_create", |e| {
        e.with_object(format!("key:{index}"))
    });
    Ok(key)
}

/// Frees a key. Destructors are not invoked; values other threads still
/// hold become unreachable.
pub fn key_delete(key: Key) -> Result<()> {
    let mut reg = REGISTRY.lock();
    let entry = reg
        .slots
        .get_mut(key.index as usize)
        .filter(|e| e.in_use && e.slot == Some(key.slot))
        .ok_or(PthreadError::InvalidArgument)?;
    MIRROR[key.index as usize].store(0, Ordering::Release);
    entry.in_use = false;
    entry.destructor = None;
    if let Some(slot) = entry.slot.take() {
        slot.free();
    }
    log::record(LogLevel::Debug, "key_delete", |e| {
        e.with_object(format!("key:{}", key.index))
    });
    Ok(())
}

/// The calling thread's value for `key`; zero if unset, deleted, or unknown.
#[must_use]
pub fn get_specific(key: Key) -> usize {
    if !key.slot.is_live() {
        return 0;
    }
    local::with_slots(|t| t.get(key.slot)).unwrap_or(0)
}

/// Stores the calling thread's value for `key`.
///
/// `InvalidArgument` if the key was deleted. A store attempted while the
/// thread's local context is being torn down is dropped.
pub fn set_specific(key: Key, value: usize) -> Result<()> {
    if !key.slot.is_live() {
        return Err(PthreadError::InvalidArgument);
    }
    let _ = local::with_slots(|t| t.set(key.slot, value));
    Ok(())
}

/// Number of live keys.
#[must_use]
pub fn live_keys() -> usize {
    REGISTRY.lock().slots.iter().filter(|s| s.in_use).count()
}

/// Runs exit destructors for the calling thread.
///
/// `take` reads and clears the exiting thread's value in a slot. Returns the
/// number of destructors invoked.
pub(crate) fn dispatch_exit_destructors(take: &mut dyn FnMut(TlsSlot) -> usize) -> usize {
    let reg = REGISTRY.lock();
    let mut calls = 0;
    for entry in reg.slots.iter().filter(|e| e.in_use) {
        let (Some(dtor), Some(slot)) = (entry.destructor.as_ref(), entry.slot) else {
            continue;
        };
        let value = take(slot);
        if value != 0 {
            dtor(value);
            calls += 1;
        }
    }
    drop(reg);
    if calls != 0 {
        log::record(LogLevel::Trace, "destructor_dispatch", |e| {
            e.with_detail(serde_json::json!({ "calls": calls }))
        });
    }
    calls
}

// Unit tests that create keys share this lock so exhaustion checks stay exact.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn create_assigns_distinct_keys() {
        let _g = TEST_LOCK.lock();
        let k1 = key_create(None).unwrap();
        let k2 = key_create(None).unwrap();
        assert_ne!(k1.as_raw(), k2.as_raw());
        key_delete(k1).unwrap();
        key_delete(k2).unwrap();
    }

    #[test]
    fn delete_twice_is_invalid() {
        let _g = TEST_LOCK.lock();
        let key = key_create(None).unwrap();
        key_delete(key).unwrap();
        assert_eq!(key_delete(key), Err(PthreadError::InvalidArgument));
    }

    #[test]
    fn stale_handle_after_reuse_is_rejected() {
        let _g = TEST_LOCK.lock();
        let old = key_create(None).unwrap();
        key_delete(old).unwrap();
        let fresh = key_create(None).unwrap();
        assert_eq!(old.as_raw(), fresh.as_raw());
        assert_eq!(key_delete(old), Err(PthreadError::InvalidArgument));
        assert_eq!(set_specific(old, 5), Err(PthreadError::InvalidArgument));
        key_delete(fresh).unwrap();
    }

    #[test]
    fn get_defaults_to_zero_and_roundtrips() {
        let _g = TEST_LOCK.lock();
        let key = key_create(None).unwrap();
        assert_eq!(get_specific(key), 0);
        set_specific(key, 0xdead).unwrap();
        assert_eq!(get_specific(key), 0xdead);
        set_specific(key, 7).unwrap();
        assert_eq!(get_specific(key), 7);
        key_delete(key).unwrap();
        assert_eq!(get_specific(key), 0);
    }

    #[test]
    fn raw_lookup_tracks_liveness() {
        let _g = TEST_LOCK.lock();
        let key = key_create(None).unwrap();
        assert_eq!(Key::from_raw(key.as_raw()), Some(key));
        key_delete(key).unwrap();
        assert_eq!(Key::from_raw(key.as_raw()), None);
        assert_eq!(Key::from_raw(PTHREAD_KEYS_MAX as u32), None);
    }

    #[test]
    fn values_are_per_thread() {
        let _g = TEST_LOCK.lock();
        let key = key_create(None).unwrap();
        set_specific(key, 1).unwrap();
        let seen = thread::spawn(move || {
            let before = get_specific(key);
            set_specific(key, 2).unwrap();
            (before, get_specific(key))
        })
        .join()
        .unwrap();
        assert_eq!(seen, (0, 2));
        assert_eq!(get_specific(key), 1);
        key_delete(key).unwrap();
    }

    #[test]
    fn exhaustion_reports_resource_exhausted() {
        let _g = TEST_LOCK.lock();
        let mut keys = Vec::new();
        let err = loop {
            match key_create(None) {
                Ok(k) => keys.push(k),
                Err(e) => break e,
            }
        };
        assert_eq!(err, PthreadError::ResourceExhausted);
        assert!(keys.len() <= PTHREAD_KEYS_MAX);
        for k in keys {
            key_delete(k).unwrap();
        }
        key_delete(key_create(None).unwrap()).unwrap();
    }

    #[test]
    fn dispatch_clears_then_calls_once() {
        let _g = TEST_LOCK.lock();
        let seen = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (s, c) = (Arc::clone(&seen), Arc::clone(&calls));
        let key = key_create(Some(Box::new(move |v| {
            s.store(v, Ordering::SeqCst);
            c.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap();
        let silent = key_create(None).unwrap();

        set_specific(key, 99).unwrap();
        set_specific(silent, 5).unwrap();
        let mut take = |slot| local::with_slots(|t| t.take(slot)).unwrap_or(0);
        assert_eq!(dispatch_exit_destructors(&mut take), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(get_specific(key), 0);
        // Keys without destructors keep their value.
        assert_eq!(get_specific(silent), 5);

        // Null values are skipped.
        assert_eq!(dispatch_exit_destructors(&mut take), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        key_delete(key).unwrap();
        key_delete(silent).unwrap();
    }

    #[test]
    fn destructor_may_use_get_and_set() {
        let _g = TEST_LOCK.lock();
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let o = Arc::clone(&observed);
        let key_cell: Arc<parking_lot::Mutex<Option<Key>>> = Arc::new(parking_lot::Mutex::new(None));
        let kc = Arc::clone(&key_cell);
        let key = key_create(Some(Box::new(move |_| {
            if let Some(k) = *kc.lock() {
                o.store(get_specific(k), Ordering::SeqCst);
                let _ = set_specific(k, 0);
            }
        })))
        .unwrap();
        *key_cell.lock() = Some(key);
        set_specific(key, 3).unwrap();
        let mut take = |slot| local::with_slots(|t| t.take(slot)).unwrap_or(0);
        dispatch_exit_destructors(&mut take);
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        key_delete(key).unwrap();
    }

    #[test]
    fn delete_does_not_call_destructor() {
        let _g = TEST_LOCK.lock();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let key = key_create(Some(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap();
        set_specific(key, 1).unwrap();
        key_delete(key).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(live_keys(), 0);
    }
}
