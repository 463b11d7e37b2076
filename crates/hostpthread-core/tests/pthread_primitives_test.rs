//! Cross-thread properties of the synchronization primitives: concurrent
//! first use, destroy/re-init cycles, and the state each primitive reports.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;
use std::time::Duration;

use hostpthread_core::PthreadError;
use hostpthread_core::config::{self, LogLevel};
use hostpthread_core::log::{self, MemorySink};
use hostpthread_core::pthread::host;
use hostpthread_core::pthread::{
    Barrier, Cond, LazyState, Mutex, MutexAttr, Once, PShared, RwLock, RwLockAttr, Timespec,
};

const THREADS: usize = 8;

// Host slot counts and the log sink are process-wide.
static TEST_GUARD: StdMutex<()> = StdMutex::new(());

/// Runs `f` with trace logging into a fresh sink and counts the
/// constructions it logged for `object`.
fn constructions_of(object: &str, f: impl FnOnce()) -> usize {
    let sink = MemorySink::new();
    log::set_sink(Box::new(sink.clone()));
    config::set_log_level(LogLevel::Trace);
    f();
    config::set_log_level(LogLevel::Off);
    log::reset_sink();
    sink.entries()
        .iter()
        .filter(|e| e.event == "primitive_init" && e.object.as_deref() == Some(object))
        .count()
}

/// Starts `THREADS` threads that wait on one gate and then run `f`.
fn race(f: impl Fn() + Send + Sync + 'static) {
    let f = Arc::new(f);
    let gate = Arc::new(std::sync::Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let f = Arc::clone(&f);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait();
                f();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn concurrent_first_use_constructs_exactly_once() {
    let _guard = TEST_GUARD.lock().unwrap();
    static M: Mutex = Mutex::new();
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    static IN_CRITICAL: AtomicBool = AtomicBool::new(false);

    // Losers of the init race must fall back to yielding.
    config::set_spin_limit(1);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(|| {
                for _ in 0..500 {
                    M.lock().unwrap();
                    assert!(!IN_CRITICAL.swap(true, Ordering::SeqCst));
                    COUNTER.fetch_add(1, Ordering::Relaxed);
                    IN_CRITICAL.store(false, Ordering::SeqCst);
                    M.unlock().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    config::set_spin_limit(config::DEFAULT_SPIN_LIMIT);
    assert_eq!(COUNTER.load(Ordering::Relaxed), THREADS * 500);
    assert_eq!(M.state(), LazyState::Initialized);
}

#[test]
fn destroy_returns_mutex_to_initializer_state() {
    let _guard = TEST_GUARD.lock().unwrap();
    let m = Mutex::new();
    m.lock().unwrap();
    // SAFETY: no other thread touches `m`.
    assert_eq!(unsafe { m.destroy() }, Err(PthreadError::Busy));
    m.unlock().unwrap();
    unsafe { m.destroy() }.unwrap();
    assert_eq!(m.state(), LazyState::Uninitialized);
    assert_eq!(unsafe { m.destroy() }, Err(PthreadError::InvalidArgument));
    assert_eq!(m.unlock(), Err(PthreadError::InvalidArgument));

    // Usable again after destroy, both by explicit init and by first use.
    m.init(None).unwrap();
    m.init(None).unwrap();
    m.lock().unwrap();
    m.unlock().unwrap();
    unsafe { m.destroy() }.unwrap();
    m.try_lock().unwrap();
    m.unlock().unwrap();
}

#[test]
fn process_shared_attributes_are_refused() {
    let _guard = TEST_GUARD.lock().unwrap();
    let mut attr = MutexAttr::default();
    attr.pshared = PShared::Shared;
    let m = Mutex::new();
    assert_eq!(m.init(Some(&attr)), Err(PthreadError::NotSupported));
    assert_eq!(m.state(), LazyState::Uninitialized);

    let mut attr = RwLockAttr::default();
    attr.pshared = PShared::Shared;
    let rw = RwLock::new();
    assert_eq!(rw.init(Some(&attr)), Err(PthreadError::NotSupported));
}

#[test]
fn mutex_is_recursive_and_owned() {
    let _guard = TEST_GUARD.lock().unwrap();
    let m = Arc::new(Mutex::new());
    m.lock().unwrap();
    m.lock().unwrap();
    m.try_lock().unwrap();

    let other = Arc::clone(&m);
    let from_other = thread::spawn(move || (other.try_lock(), other.unlock()))
        .join()
        .unwrap();
    assert_eq!(from_other, (Err(PthreadError::Busy), Err(PthreadError::NotPermitted)));

    for _ in 0..3 {
        m.unlock().unwrap();
    }
    assert_eq!(m.unlock(), Err(PthreadError::NotPermitted));
}

#[test]
fn cond_wait_hands_off_between_threads() {
    let _guard = TEST_GUARD.lock().unwrap();
    struct Queue {
        lock: Mutex,
        ready: Cond,
        items: parking_lot::Mutex<Vec<u32>>,
    }
    let q = Arc::new(Queue {
        lock: Mutex::new(),
        ready: Cond::new(),
        items: parking_lot::Mutex::new(Vec::new()),
    });

    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut got = Vec::new();
            q.lock.lock().unwrap();
            while got.len() < 20 {
                let batch: Vec<u32> = q.items.lock().drain(..).collect();
                if batch.is_empty() {
                    q.ready.wait(&q.lock).unwrap();
                } else {
                    got.extend(batch);
                }
            }
            q.lock.unlock().unwrap();
            got
        })
    };

    for i in 0..20 {
        q.lock.lock().unwrap();
        q.items.lock().push(i);
        q.ready.signal();
        q.lock.unlock().unwrap();
    }
    assert_eq!(consumer.join().unwrap(), (0..20).collect::<Vec<_>>());
}

#[test]
fn cond_wait_restores_recursion_depth() {
    let _guard = TEST_GUARD.lock().unwrap();
    let m = Mutex::new();
    let c = Cond::new();
    m.lock().unwrap();
    m.lock().unwrap();
    let deadline = Timespec::now().after(Duration::from_millis(20));
    assert_eq!(c.timed_wait(&m, deadline), Err(PthreadError::TimedOut));
    m.unlock().unwrap();
    m.unlock().unwrap();
    assert_eq!(m.unlock(), Err(PthreadError::NotPermitted));
}

#[test]
fn cond_wait_requires_live_mutex() {
    let _guard = TEST_GUARD.lock().unwrap();
    let m = Mutex::new();
    let c = Cond::new();
    assert_eq!(c.wait(&m), Err(PthreadError::InvalidArgument));
    assert_eq!(
        c.timed_wait(&m, Timespec::new(0, 2_000_000_000)),
        Err(PthreadError::InvalidArgument)
    );
}

#[test]
fn rwlock_excludes_writers_from_readers() {
    let _guard = TEST_GUARD.lock().unwrap();
    let rw = Arc::new(RwLock::new());
    let shared = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let rw = Arc::clone(&rw);
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        rw.write_lock().unwrap();
                        let v = shared.load(Ordering::Relaxed);
                        thread::yield_now();
                        shared.store(v + 1, Ordering::Relaxed);
                    } else {
                        rw.read_lock().unwrap();
                        let _ = shared.load(Ordering::Relaxed);
                    }
                    rw.unlock().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.load(Ordering::Relaxed), THREADS / 2 * 200);
    assert_eq!(rw.held_levels(), 0);
}

#[test]
fn rwlock_tracks_modes_per_thread() {
    let _guard = TEST_GUARD.lock().unwrap();
    let rw = Arc::new(RwLock::new());
    rw.read_lock().unwrap();
    rw.read_lock().unwrap();
    // Upgrading while this thread is the only reader.
    rw.write_lock().unwrap();
    assert_eq!(rw.held_levels(), 3);

    let other = Arc::clone(&rw);
    let seen = thread::spawn(move || (other.held_levels(), other.unlock(), other.try_read_lock()))
        .join()
        .unwrap();
    assert_eq!(seen, (0, Err(PthreadError::NotPermitted), Err(PthreadError::Busy)));

    for _ in 0..3 {
        rw.unlock().unwrap();
    }
    assert_eq!(rw.unlock(), Err(PthreadError::NotPermitted));
    unsafe { rw.destroy() }.unwrap();
    assert_eq!(rw.state(), LazyState::Uninitialized);
}

#[test]
fn barrier_elects_one_serial_thread_per_round() {
    let _guard = TEST_GUARD.lock().unwrap();
    const ROUNDS: usize = 5;
    let barrier = Arc::new(Barrier::new());
    barrier.init(None, THREADS as u32).unwrap();
    let serial = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let serial = Arc::clone(&serial);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    if barrier.wait().unwrap().is_serial() {
                        serial.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(serial.load(Ordering::SeqCst), ROUNDS);
    unsafe { barrier.destroy() }.unwrap();
    assert_eq!(barrier.wait(), Err(PthreadError::InvalidArgument));
    assert_eq!(barrier.init(None, 0), Err(PthreadError::InvalidArgument));
}

#[test]
fn once_runs_single_initializer_under_contention() {
    let _guard = TEST_GUARD.lock().unwrap();
    static ONCE: Once = Once::new();
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(|| {
                ONCE.call_once(|| {
                    thread::sleep(Duration::from_millis(5));
                    CALLS.fetch_add(1, Ordering::SeqCst);
                });
                assert!(ONCE.is_completed());
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_first_rwlock_use_claims_one_slot() {
    let _guard = TEST_GUARD.lock().unwrap();
    static RW: RwLock = RwLock::new();
    static TURN: AtomicUsize = AtomicUsize::new(0);
    let before = host::slots_in_use();
    let built = constructions_of("rwlock", || {
        race(|| {
            if TURN.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                RW.read_lock().unwrap();
            } else {
                RW.write_lock().unwrap();
            }
            RW.unlock().unwrap();
        });
    });
    assert_eq!(built, 1);
    assert_eq!(host::slots_in_use(), before + 1);
    assert_eq!(RW.state(), LazyState::Initialized);
}

#[test]
fn concurrent_first_cond_wait_constructs_once() {
    let _guard = TEST_GUARD.lock().unwrap();
    static M: Mutex = Mutex::new();
    static C: Cond = Cond::new();
    M.init(None).unwrap();
    let built = constructions_of("cond", || {
        race(|| {
            M.lock().unwrap();
            let deadline = Timespec::now().after(Duration::from_millis(5));
            assert_eq!(C.timed_wait(&M, deadline), Err(PthreadError::TimedOut));
            M.unlock().unwrap();
        });
    });
    assert_eq!(built, 1);
    assert_eq!(C.state(), LazyState::Initialized);
}

#[test]
fn concurrent_barrier_init_constructs_once() {
    let _guard = TEST_GUARD.lock().unwrap();
    static B: Barrier = Barrier::new();
    let built = constructions_of("barrier", || {
        race(|| B.init(None, THREADS as u32).unwrap());
    });
    assert_eq!(built, 1);
    assert_eq!(B.count(), Some(THREADS as u32));
}
