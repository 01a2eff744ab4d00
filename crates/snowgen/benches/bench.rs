use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use snowgen::{DEFAULT_EPOCH, IdGenerator, Layout, MonotonicClock, Poll, TimeSource};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded). Equal to one millisecond of the default layout, so a fixed
// clock never exhausts the sequence.
const TOTAL_IDS: usize = 4096;

fn mock_generator() -> IdGenerator<FixedMockTime> {
    let time = FixedMockTime {
        millis: DEFAULT_EPOCH + 1,
    };
    IdGenerator::new(1, 1, Layout::default(), time).unwrap()
}

fn monotonic_generator() -> IdGenerator<MonotonicClock> {
    IdGenerator::new(1, 1, Layout::default(), MonotonicClock::new()).unwrap()
}

/// Benchmarks the blocking hot path on a single thread.
fn bench_generate<T>(
    c: &mut Criterion,
    group_name: &str,
    generator_factory: impl Fn() -> IdGenerator<T>,
) where
    T: TimeSource,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator = generator_factory();
                for _ in 0..TOTAL_IDS {
                    black_box(generator.generate().unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks the non-blocking path, spinning on `Pending`.
fn bench_poll<T>(
    c: &mut Criterion,
    group_name: &str,
    generator_factory: impl Fn() -> IdGenerator<T>,
) where
    T: TimeSource,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator = generator_factory();
                for _ in 0..TOTAL_IDS {
                    loop {
                        match generator.poll_id().unwrap() {
                            Poll::Ready { id } => {
                                black_box(id);
                                break;
                            }
                            Poll::Pending { .. } => core::hint::spin_loop(),
                        }
                    }
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks one generator shared across threads.
fn bench_generate_contended<T>(
    c: &mut Criterion,
    group_name: &str,
    generator_factory: impl Fn() -> IdGenerator<T>,
) where
    T: TimeSource + Send + Sync,
{
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/threads/{thread_count}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();

                for _ in 0..iters {
                    let generator = Arc::new(generator_factory());
                    let barrier = Arc::new(Barrier::new(thread_count + 1));
                    scope(|s| {
                        for _ in 0..thread_count {
                            let generator = Arc::clone(&generator);
                            let barrier = Arc::clone(&barrier);
                            s.spawn(move || {
                                barrier.wait();
                                for _ in 0..ids_per_thread {
                                    black_box(generator.generate().unwrap());
                                }
                            });
                        }
                        barrier.wait();
                    });
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_mock_sequential(c: &mut Criterion) {
    bench_generate(c, "mock/sequential/generate", mock_generator);
}

fn benchmark_mock_sequential_poll(c: &mut Criterion) {
    bench_poll(c, "mock/sequential/poll", mock_generator);
}

fn benchmark_mock_contended(c: &mut Criterion) {
    bench_generate_contended(c, "mock/contended/generate", mock_generator);
}

fn benchmark_mono_sequential(c: &mut Criterion) {
    bench_generate(c, "mono/sequential/generate", monotonic_generator);
}

fn benchmark_mono_sequential_poll(c: &mut Criterion) {
    bench_poll(c, "mono/sequential/poll", monotonic_generator);
}

fn benchmark_mono_contended(c: &mut Criterion) {
    bench_generate_contended(c, "mono/contended/generate", monotonic_generator);
}

criterion_group!(
    benches,
    // Mock clock
    benchmark_mock_sequential,
    benchmark_mock_sequential_poll,
    benchmark_mock_contended,
    // Monotonic clock (waits on exhaustion)
    benchmark_mono_sequential,
    benchmark_mono_sequential_poll,
    benchmark_mono_contended,
);
criterion_main!(benches);
