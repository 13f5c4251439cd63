use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use refresca::{Expiration, KeyedCache, OnDemandCache};
use std::sync::Arc;
use std::thread;

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    for size in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache: KeyedCache<String, i32> = KeyedCache::new(Expiration::Never);
                for i in 0..size {
                    cache.insert(format!("key{}", i), black_box(i as i32));
                }
            });
        });
    }

    group.finish();
}

fn bench_get_valid_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_valid_sequential");

    for size in [10usize, 100, 1000].iter() {
        // Pre-populate cache
        let cache: KeyedCache<String, i32> = KeyedCache::new(Expiration::Never);
        for i in 0..*size {
            cache.insert(format!("key{}", i), i as i32);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(cache.get_valid(&format!("key{}", i)));
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_reads");

    // Pre-populate a shared cache
    let cache: Arc<KeyedCache<String, i32>> = Arc::new(KeyedCache::new(Expiration::Never));
    for i in 0..100 {
        cache.insert(format!("key{}", i), i);
    }

    for num_threads in [2, 4, 8].iter() {
        let cache = Arc::clone(&cache);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            move |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let cache = Arc::clone(&cache);
                            thread::spawn(move || {
                                for i in 0..100 {
                                    black_box(cache.get_valid(&format!("key{}", i % 100)));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed");

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let cache: Arc<KeyedCache<String, i32>> =
                        Arc::new(KeyedCache::new(Expiration::Never));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let cache = Arc::clone(&cache);
                            thread::spawn(move || {
                                for i in 0..50 {
                                    if i % 2 == 0 {
                                        cache.insert(
                                            format!("key{}", thread_id * 50 + i),
                                            black_box(i),
                                        );
                                    } else {
                                        black_box(
                                            cache.get_valid(&format!("key{}", thread_id * 50 + i)),
                                        );
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_on_demand_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_demand_hits");

    let cache: OnDemandCache<u64, u64, String> =
        OnDemandCache::new(Expiration::Never, |key| Ok(key * 2));
    // Warm the store so the loop measures pure hit cost.
    for i in 0..100u64 {
        let _ = cache.get(&i);
    }

    group.bench_function("warm_get", |b| {
        b.iter(|| {
            for i in 0..100u64 {
                black_box(cache.get(&i).ok());
            }
        });
    });

    group.finish();
}

fn bench_cleanup_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleanup_pass");

    group.bench_function("expired_1000", |b| {
        b.iter(|| {
            // Everything expires immediately; the pass removes it all.
            let cache: KeyedCache<String, i32> = KeyedCache::new(Expiration::Always);
            for i in 0..1000 {
                cache.insert(format!("key{}", i), i);
            }
            black_box(cache.cleanup());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_get_valid_sequential,
    bench_concurrent_reads,
    bench_concurrent_mixed,
    bench_on_demand_hits,
    bench_cleanup_pass
);
criterion_main!(benches);
