//! Thread lifecycle seen from outside the crate: create/join/detach, exit
//! and cancellation unwinding through cleanup handlers, and key destructors
//! on the exit path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread as std_thread;
use std::time::Duration;

use hostpthread_core::PthreadError;
use hostpthread_core::pthread::thread::{detach_current, live_threads};
use hostpthread_core::pthread::{
    self, CancelState, DetachState, ExitStatus, Phase, Thread, ThreadAttr, cleanup,
    cleanup_push,
};

static TEST_GUARD: StdMutex<()> = StdMutex::new(());

fn wait_for(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        std_thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn joined_thread_leaves_the_live_table() {
    let _guard = TEST_GUARD.lock().unwrap();
    let before = live_threads();
    let t = pthread::create(None, || 5).unwrap();
    let id = t.id();
    assert!(Thread::from_id(id).is_ok());
    assert_eq!(t.join(), Ok(ExitStatus::Value(5)));
    assert_eq!(t.phase(), Phase::Joined);
    assert_eq!(Thread::from_id(id), Err(PthreadError::NoSuchThread));
    assert_eq!(live_threads(), before);
}

#[test]
fn detached_attribute_releases_on_exit() {
    let _guard = TEST_GUARD.lock().unwrap();
    let go = Arc::new(AtomicBool::new(false));
    let mut attr = ThreadAttr::new();
    attr.set_detach_state(DetachState::Detached);
    let t = {
        let go = Arc::clone(&go);
        pthread::create(Some(&attr), move || {
            wait_for(&go);
            0
        })
        .unwrap()
    };
    assert!(t.is_detached());
    assert_eq!(t.join(), Err(PthreadError::InvalidArgument));
    go.store(true, Ordering::SeqCst);
    while t.phase() != Phase::Released {
        std_thread::yield_now();
    }
    assert_eq!(Thread::from_id(t.id()), Err(PthreadError::NoSuchThread));
    assert_eq!(t.detach(), Err(PthreadError::InvalidArgument));
}

#[test]
fn exit_from_nested_frames_runs_handlers_innermost_first() {
    let _guard = TEST_GUARD.lock().unwrap();
    let order = Arc::new(StdMutex::new(Vec::new()));

    fn nested(order: Arc<StdMutex<Vec<&'static str>>>) -> usize {
        let o = Arc::clone(&order);
        let _inner = cleanup_push(move || o.lock().unwrap().push("inner"));
        pthread::exit(77)
    }

    let t = {
        let order = Arc::clone(&order);
        pthread::create(None, move || {
            let o = Arc::clone(&order);
            let _outer = cleanup_push(move || o.lock().unwrap().push("outer"));
            let o = Arc::clone(&order);
            cleanup::push_handler(move || o.lock().unwrap().push("raw"));
            nested(order)
        })
        .unwrap()
    };
    assert_eq!(t.join(), Ok(ExitStatus::Value(77)));
    // The raw handler sits above the outer guard and goes with it.
    assert_eq!(*order.lock().unwrap(), vec!["inner", "raw", "outer"]);
}

#[test]
fn popped_guard_does_not_run_at_exit() {
    let _guard = TEST_GUARD.lock().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let t = {
        let ran = Arc::clone(&ran);
        pthread::create(None, move || {
            let r = Arc::clone(&ran);
            let g = cleanup_push(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
            g.pop(false);
            let r = Arc::clone(&ran);
            let g = cleanup_push(move || {
                r.fetch_add(10, Ordering::SeqCst);
            });
            g.pop(true);
            pthread::exit(0)
        })
        .unwrap()
    };
    t.join().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 10);
}

#[test]
fn cancellation_waits_for_enabled_checkpoint() {
    let _guard = TEST_GUARD.lock().unwrap();
    let requested = Arc::new(AtomicBool::new(false));
    let reached_disabled = Arc::new(AtomicBool::new(false));
    let t = {
        let requested = Arc::clone(&requested);
        let reached_disabled = Arc::clone(&reached_disabled);
        pthread::create(None, move || {
            pthread::set_cancel_state(CancelState::Disable);
            wait_for(&requested);
            pthread::test_cancel();
            reached_disabled.store(true, Ordering::SeqCst);
            pthread::set_cancel_state(CancelState::Enable);
            pthread::test_cancel();
            1
        })
        .unwrap()
    };
    t.cancel().unwrap();
    requested.store(true, Ordering::SeqCst);
    assert_eq!(t.join(), Ok(ExitStatus::Canceled));
    assert!(reached_disabled.load(Ordering::SeqCst));
    assert_eq!(t.cancel(), Err(PthreadError::NoSuchThread));
}

#[test]
fn key_destructors_see_each_threads_value() {
    let _guard = TEST_GUARD.lock().unwrap();
    let seen = Arc::new(StdMutex::new(Vec::<usize>::new()));
    let key = {
        let seen = Arc::clone(&seen);
        pthread::key_create(Some(Box::new(move |v: usize| seen.lock().unwrap().push(v)))).unwrap()
    };

    let threads: Vec<_> = (1..=4)
        .map(|i| {
            pthread::create(None, move || {
                assert_eq!(pthread::get_specific(key), 0);
                pthread::set_specific(key, i * 100).unwrap();
                if i == 4 {
                    pthread::set_specific(key, 0).unwrap();
                }
                0
            })
            .unwrap()
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    let mut values = seen.lock().unwrap().clone();
    values.sort_unstable();
    assert_eq!(values, vec![100, 200, 300]);
    pthread::key_delete(key).unwrap();
    assert_eq!(pthread::key_delete(key), Err(PthreadError::InvalidArgument));
}

#[test]
fn foreign_thread_is_adopted_and_released() {
    let _guard = TEST_GUARD.lock().unwrap();
    let before = live_threads();
    let id = std_thread::spawn(|| {
        let me = pthread::current();
        assert!(me.is_detached());
        assert!(pthread::equal(&me, &pthread::current()));
        assert_eq!(me.join(), Err(PthreadError::Deadlock));
        me.id()
    })
    .join()
    .unwrap();
    assert_eq!(Thread::from_id(id), Err(PthreadError::NoSuchThread));
    assert_eq!(live_threads(), before);
}

#[test]
fn detach_hook_runs_exit_path_once() {
    let _guard = TEST_GUARD.lock().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    let observed = std_thread::spawn(move || {
        let _ = pthread::current();
        let r2 = Arc::clone(&r);
        cleanup::push_handler(move || {
            r2.fetch_add(1, Ordering::SeqCst);
        });
        detach_current();
        detach_current();
        r.load(Ordering::SeqCst)
    })
    .join()
    .unwrap();
    assert_eq!(observed, 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
