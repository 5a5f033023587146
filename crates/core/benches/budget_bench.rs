//! Budget and retry benchmarks
//!
//! Covers the hot paths every retried call goes through: windowed adds,
//! bucket withdrawals, budget deposit/withdraw pairs and the retry loop
//! itself, single-threaded and under contention.
//!
//! Run with: `cargo bench --bench budget_bench -p tollgate-core`

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;
use tollgate_common::time::SystemClock;
use tollgate_core::budget::{RetryBudget, RetryBudgets};
use tollgate_core::retry::{OperationError, Retry};
use tollgate_core::{BoundedTokenBucket, StripedAdder, TokenBucket, WindowedAdder};

// ============================================================================
// Accumulators
// ============================================================================

fn bench_adders(c: &mut Criterion) {
    let mut group = c.benchmark_group("adders");

    group.bench_function("striped_add", |b| {
        let adder = StripedAdder::new();
        b.iter(|| adder.add(black_box(1)));
    });

    group.bench_function("windowed_add", |b| {
        let adder = WindowedAdder::new(10_000, 10).expect("valid window");
        b.iter(|| adder.add(black_box(1)));
    });

    group.bench_function("windowed_sum", |b| {
        let adder = WindowedAdder::new(10_000, 10).expect("valid window");
        adder.add(42);
        b.iter(|| black_box(adder.sum()));
    });

    for threads in [2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("windowed_add_contended", threads),
            &threads,
            |b, &threads| {
                let adder = Arc::new(WindowedAdder::new(10_000, 10).expect("valid window"));
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let adder = Arc::clone(&adder);
                            thread::spawn(move || {
                                for _ in 0..1_000 {
                                    adder.incr();
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().expect("writer thread panicked");
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Buckets and budgets
// ============================================================================

fn bench_budgets(c: &mut Criterion) {
    let mut group = c.benchmark_group("budgets");

    group.bench_function("bounded_put_get", |b| {
        let bucket = BoundedTokenBucket::new(1_000).expect("valid limit");
        b.iter(|| {
            bucket.put(1).expect("positive amount");
            black_box(bucket.try_get(1).expect("positive amount"));
        });
    });

    group.bench_function("token_deposit_withdraw", |b| {
        let budget = RetryBudgets::create_default(SystemClock).expect("default budget");
        b.iter(|| {
            budget.deposit();
            black_box(budget.try_withdraw());
        });
    });

    group.bench_function("token_balance", |b| {
        let budget = RetryBudgets::create_default(SystemClock).expect("default budget");
        b.iter(|| black_box(budget.balance()));
    });

    group.finish();
}

// ============================================================================
// Retry loop
// ============================================================================

fn bench_retry(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry");

    group.bench_function("call_success", |b| {
        let retry = Retry::constant_backoff(3, 0.0).expect("valid schedule");
        b.iter(|| {
            let result = retry.call(|attempt| Ok::<_, OperationError<std::io::Error>>(attempt));
            black_box(result.is_ok());
        });
    });

    group.bench_function("call_exhausts_limit", |b| {
        let retry = Retry::builder()
            .constant_backoff(3, 0.0)
            .budget(RetryBudgets::infinite())
            .build()
            .expect("valid schedule");
        b.iter(|| {
            let result = retry.call(|_| {
                Err::<(), _>(OperationError::Failed(std::io::Error::other("benchmark failure")))
            });
            black_box(result.is_err());
        });
    });

    group.bench_function("call_async_success", |b| {
        let runtime = RuntimeBuilder::new_current_thread()
            .enable_time()
            .build()
            .expect("tokio runtime for benchmarks");
        let retry = Retry::constant_backoff(3, 0.0).expect("valid schedule");
        b.to_async(&runtime).iter(|| {
            let retry = retry.clone();
            async move {
                let result = retry
                    .call_async(|attempt| async move {
                        Ok::<_, OperationError<std::io::Error>>(attempt)
                    })
                    .await;
                black_box(result.is_ok());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_adders, bench_budgets, bench_retry);
criterion_main!(benches);
