//! End-to-end wrapped call benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use txscope_bench::utils::random_writes;
use txscope_core::{CallContext, Failure, Propagation};
use txscope_testkit::{AsyncMemoryEnv, MemoryEnv};

/// Benchmark a blocking call that creates and commits a scope.
fn bench_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking");

    for count in [0usize, 10, 100] {
        let env = MemoryEnv::new();
        let save = env.wrap_with(Propagation::Required);
        let writes = random_writes(count);
        group.bench_with_input(BenchmarkId::new("commit", count), &writes, |b, writes| {
            b.iter(|| {
                save.call_root(|frame| {
                    if let Some(scope) = frame.scope() {
                        for (key, value) in writes {
                            scope.put(key.clone(), value.clone())?;
                        }
                    }
                    Ok(())
                })
                .unwrap();
            });
        });
    }

    group.bench_function("nested_reuse", |b| {
        let env = MemoryEnv::new();
        let outer = env.wrap_with(Propagation::Required);
        let inner = env.wrap_with(Propagation::Mandatory);
        b.iter(|| {
            outer
                .call_root(|frame| {
                    inner.call(frame.context(), |nested| Ok(black_box(nested.has_scope())))?;
                    Ok(())
                })
                .unwrap();
        });
    });

    group.bench_function("unscoped", |b| {
        let env = MemoryEnv::new();
        let read = env.wrap_with(Propagation::Supports);
        let ctx = CallContext::new();
        b.iter(|| read.call(&ctx, |frame| Ok(black_box(frame.has_scope()))).unwrap());
    });

    group.finish();
}

/// Benchmark an async call that creates and commits a scope.
fn bench_async(c: &mut Criterion) {
    let mut group = c.benchmark_group("async");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    group.bench_function("commit", |b| {
        let env = AsyncMemoryEnv::new();
        let save = env.wrap_with(Propagation::Required);
        b.iter(|| {
            runtime
                .block_on(save.call_root(|frame| async move {
                    frame.scope().map(|scope| scope.put("k", "v")).transpose()?;
                    Ok::<_, Failure>(())
                }))
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_blocking, bench_async);
criterion_main!(benches);
