//! Mutex benchmarks: the core engine, the C boundary, and std for scale.

use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hostpthread_abi::PTHREAD_MUTEX_INITIALIZER;
use hostpthread_abi::mutex_abi::{pthread_mutex_lock, pthread_mutex_unlock};
use hostpthread_core::pthread::Mutex;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_uncontended");

    let m = Mutex::new();
    group.bench_function("core", |b| {
        b.iter(|| {
            m.lock().unwrap();
            m.unlock().unwrap();
        });
    });

    let storage = PTHREAD_MUTEX_INITIALIZER;
    let ptr = &storage as *const _ as *mut _;
    group.bench_function("abi", |b| {
        b.iter(|| unsafe {
            criterion::black_box(pthread_mutex_lock(ptr));
            criterion::black_box(pthread_mutex_unlock(ptr));
        });
    });

    let std_m = std::sync::Mutex::new(());
    group.bench_function("std", |b| {
        b.iter(|| drop(criterion::black_box(std_m.lock().unwrap())));
    });

    group.finish();
}

fn bench_recursive(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_recursive");
    let m = Mutex::new();
    for depth in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("core", depth), &depth, |b, &d| {
            b.iter(|| {
                for _ in 0..d {
                    m.lock().unwrap();
                }
                for _ in 0..d {
                    m.unlock().unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_contended");
    group.sample_size(20);
    for threads in [2usize, 4] {
        group.bench_with_input(BenchmarkId::new("core", threads), &threads, |b, &n| {
            let m = Arc::new(Mutex::new());
            b.iter(|| {
                let handles: Vec<_> = (0..n)
                    .map(|_| {
                        let m = Arc::clone(&m);
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                m.lock().unwrap();
                                m.unlock().unwrap();
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_recursive, bench_contended);
criterion_main!(benches);
