//! Benchmarks for the hot paths that run under a queue lock or per retry:
//! the backoff calculator, the rate estimator and a full
//! insert/acquire/acknowledge cycle.

use anvilq::metrics::RateCounter;
use anvilq::prelude::*;
use anvilq::utils::next_backoff;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

fn bench_next_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_backoff");

    for retries in [1u32, 10, 100] {
        group.bench_with_input(BenchmarkId::new("linear", retries), &retries, |b, &retries| {
            b.iter(|| {
                let mut delay = 0.0;
                let mut retry = 0;
                for _ in 0..retries {
                    (delay, retry) = next_backoff(0.0, 1.0, black_box(0.5), 60.0, retry);
                }
                black_box((delay, retry))
            })
        });
    }

    group.bench_function("disabled", |b| {
        b.iter(|| next_backoff(0.0, black_box(0.0), 1.0, 60.0, black_box(7)))
    });

    group.finish();
}

fn bench_rate_counter(c: &mut Criterion) {
    c.bench_function("rate_counter_push", |b| {
        let mut counter = RateCounter::default();
        let mut lived = Duration::from_millis(1);
        b.iter(|| {
            lived += Duration::from_micros(10);
            black_box(counter.push(1.0, lived))
        })
    });
}

fn bench_queue_cycle(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().build() else {
        return;
    };
    let queue = BoundedQueue::new(QueueConfig::with_workers(1).with_length(1_024));

    c.bench_function("queue_insert_acquire_ack", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let (ctx, _out) = Context::from_fn(Priority::Normal, |_, _| async { Ok(()) });
                let _ = queue.insert(Priority::Normal, ctx).await;
                if let Some(task) = queue.acquire().await {
                    queue.acknowledge(&task, &Ok(())).await;
                }
            })
        })
    });
}

criterion_group!(benches, bench_next_backoff, bench_rate_counter, bench_queue_cycle);
criterion_main!(benches);
