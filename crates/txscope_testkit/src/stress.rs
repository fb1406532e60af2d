//! Concurrent call-chain stress helpers.
//!
//! Each chain runs on its own thread (or tokio task) with its own
//! [`CallContext`] and nests wrapped calls `depth` levels deep, cycling
//! through REQUIRES_NEW, REQUIRED, SUPPORTS and MANDATORY. Every frame that
//! joins a scope checks that the scope was opened by its own chain.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use txscope_core::{AsyncTransactional, CallContext, Failure, Propagation, Transactional};

use crate::async_memory::{AsyncMemoryProvider, AsyncMemoryScope};
use crate::fixtures::{AsyncMemoryEnv, MemoryEnv};
use crate::memory::{MemoryProvider, MemoryScope};

const LEVELS: [Propagation; 4] = [
    Propagation::RequiresNew,
    Propagation::Required,
    Propagation::Supports,
    Propagation::Mandatory,
];

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Independent call chains run concurrently.
    pub chains: usize,
    /// Nesting depth of each call.
    pub depth: usize,
    /// Top-level calls per chain.
    pub iterations: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            chains: 8,
            depth: 6,
            iterations: 50,
        }
    }
}

/// Outcome of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Top-level calls that succeeded.
    pub successful: usize,
    /// Top-level calls that failed.
    pub failed: usize,
    /// Frames that joined a scope opened by another chain.
    pub foreign_scopes: usize,
    /// Stack entries left behind after top-level calls returned.
    pub leaked_entries: usize,
    /// Wall time.
    pub duration: Duration,
}

impl StressResult {
    /// Returns true if nothing failed, leaked or crossed chains.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.foreign_scopes == 0 && self.leaked_entries == 0
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Successful: {}", self.successful);
        println!("Failed: {}", self.failed);
        println!("Foreign scopes: {}", self.foreign_scopes);
        println!("Leaked entries: {}", self.leaked_entries);
        println!("Duration: {:?}", self.duration);
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
    foreign: AtomicUsize,
    leaked: AtomicUsize,
}

impl Tally {
    fn finish(&self, start: Instant) -> StressResult {
        StressResult {
            successful: self.successful.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            foreign_scopes: self.foreign.load(Ordering::SeqCst),
            leaked_entries: self.leaked.load(Ordering::SeqCst),
            duration: start.elapsed(),
        }
    }

    fn record(&self, ok: bool, depth_after: usize) {
        if ok {
            self.successful.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.leaked.fetch_add(depth_after, Ordering::SeqCst);
    }
}

fn observe(scope: Option<u64>, owns: bool, owned: &Mutex<HashSet<u64>>, tally: &Tally) {
    if let Some(id) = scope {
        if owns {
            owned.lock().insert(id);
        } else if !owned.lock().contains(&id) {
            tally.foreign.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn nest(
    wrappers: &[Transactional<MemoryProvider>],
    ctx: &CallContext<MemoryScope>,
    level: usize,
    owned: &Mutex<HashSet<u64>>,
    tally: &Tally,
) -> Result<(), Failure> {
    let Some(wrapper) = wrappers.get(level) else {
        return Ok(());
    };
    wrapper
        .call(ctx, |frame| {
            observe(frame.scope().map(MemoryScope::id), frame.owns_scope(), owned, tally);
            if let Some(scope) = frame.scope().filter(|_| frame.owns_scope()) {
                scope.put(format!("level-{level}"), scope.id().to_string())?;
            }
            nest(wrappers, frame.context(), level + 1, owned, tally)
        })
        .map_err(Failure::from)
}

/// Runs `config.chains` blocking chains on separate threads.
pub fn stress_blocking_chains(env: &MemoryEnv, config: &StressConfig) -> StressResult {
    let wrappers: Vec<_> = (0..config.depth)
        .map(|level| env.wrap_with(LEVELS[level % LEVELS.len()]))
        .collect();
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for _ in 0..config.chains {
            s.spawn(|| {
                let owned = Mutex::new(HashSet::new());
                for _ in 0..config.iterations {
                    let ctx = CallContext::new();
                    let ok = nest(&wrappers, &ctx, 0, &owned, &tally).is_ok();
                    tally.record(ok, ctx.depth());
                }
            });
        }
    });

    tally.finish(start)
}

fn nest_async(
    wrappers: Arc<Vec<AsyncTransactional<AsyncMemoryProvider>>>,
    ctx: CallContext<AsyncMemoryScope>,
    level: usize,
    owned: Arc<Mutex<HashSet<u64>>>,
    tally: Arc<Tally>,
) -> BoxFuture<Result<(), Failure>> {
    Box::pin(async move {
        let Some(wrapper) = wrappers.get(level) else {
            return Ok(());
        };
        wrapper
            .call(&ctx, |frame| {
                let wrappers = Arc::clone(&wrappers);
                let owned = Arc::clone(&owned);
                let tally = Arc::clone(&tally);
                async move {
                    observe(
                        frame.scope().map(|scope| scope.id()),
                        frame.owns_scope(),
                        &owned,
                        &tally,
                    );
                    tokio::task::yield_now().await;
                    nest_async(wrappers, frame.context().clone(), level + 1, owned, tally).await
                }
            })
            .await
            .map_err(Failure::from)
    })
}

/// Runs `config.chains` async chains as tokio tasks.
///
/// Must be called from within a tokio runtime.
pub async fn stress_async_chains(env: &AsyncMemoryEnv, config: &StressConfig) -> StressResult {
    let wrappers: Arc<Vec<_>> = Arc::new(
        (0..config.depth)
            .map(|level| env.wrap_with(LEVELS[level % LEVELS.len()]))
            .collect(),
    );
    let tally = Arc::new(Tally::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.chains)
        .map(|_| {
            let wrappers = Arc::clone(&wrappers);
            let tally = Arc::clone(&tally);
            let iterations = config.iterations;
            tokio::spawn(async move {
                let owned = Arc::new(Mutex::new(HashSet::new()));
                for _ in 0..iterations {
                    let ctx = CallContext::new();
                    let ok = nest_async(
                        Arc::clone(&wrappers),
                        ctx.clone(),
                        0,
                        Arc::clone(&owned),
                        Arc::clone(&tally),
                    )
                    .await
                    .is_ok();
                    tally.record(ok, ctx.depth());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("Stress task panicked");
    }

    tally.finish(start)
}
