//! Declarative transactional wrappers.
//!
//! A wrapper is declared once with a registry and validated
//! [`TransactionOptions`], then called any number of times. Every call
//! composes the same layers:
//!
//! ```text
//! registry lookup -> RetryPolicy -> TimeoutGuard -> ScopeOrchestrator -> body
//! ```
//!
//! The scheduling mode is fixed at declaration time: [`Transactional`] serves
//! blocking providers and bodies, [`AsyncTransactional`] serves async ones.
//! Declaring a wrapper with options whose `mode` does not match fails with a
//! configuration error.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Arc::new(ScopeRegistry::new());
//! registry.register("default", Arc::new(provider), false)?;
//!
//! let save = Transactional::new(Arc::clone(&registry), TransactionOptions::default())?;
//! let ctx = CallContext::new();
//! save.call(&ctx, |frame| {
//!     let scope = frame.scope().ok_or_else(|| Failure::application("state", "no scope"))?;
//!     write_rows(scope)
//! })?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::{CallContext, Frame};
use crate::error::{Failure, TxError, TxResult};
use crate::options::TransactionOptions;
use crate::orchestrator::ScopeOrchestrator;
use crate::provider::{AsyncResourceProvider, ResourceProvider};
use crate::registry::ScopeRegistry;
use crate::retry::RetryPolicy;
use crate::stats::TransactionStats;
use crate::timeout::TimeoutGuard;
use crate::types::TransactionMode;

fn check_mode(options: &TransactionOptions, expected: TransactionMode) -> TxResult<()> {
    if options.mode() == expected {
        Ok(())
    } else {
        Err(TxError::configuration(format!(
            "{} options cannot be used with a {} wrapper",
            options.mode(),
            expected
        )))
    }
}

fn record_outcome<T>(stats: &TransactionStats, result: &TxResult<T>) {
    if let Err(err) = result {
        stats.record_failure();
        if err.is_timeout() {
            stats.record_timeout();
        }
    }
}

/// Blocking transactional wrapper.
pub struct Transactional<P> {
    registry: Arc<ScopeRegistry<P>>,
    options: TransactionOptions,
    stats: Arc<TransactionStats>,
}

impl<P: ResourceProvider> Transactional<P> {
    /// Declares a blocking wrapper.
    ///
    /// Fails if `options` are configured for async mode.
    pub fn new(registry: Arc<ScopeRegistry<P>>, options: TransactionOptions) -> TxResult<Self> {
        check_mode(&options, TransactionMode::Sync)?;
        Ok(Self {
            registry,
            options,
            stats: Arc::new(TransactionStats::new()),
        })
    }

    /// Calls `body` inside the call chain of `ctx`.
    ///
    /// `body` may run more than once when retries are configured.
    ///
    /// A blocking body cannot be interrupted from outside. When a timeout is
    /// configured the body must wait through [`Frame::sleep`] and poll
    /// [`Frame::checkpoint`] in long loops; a plain `std::thread::sleep`
    /// overruns the deadline, and the attempt is then rolled back instead of
    /// committed.
    pub fn call<T, F>(&self, ctx: &CallContext<P::Scope>, mut body: F) -> TxResult<T>
    where
        F: FnMut(&Frame<P::Scope>) -> Result<T, Failure>,
    {
        self.stats.record_call();
        let result = self.registry.get(self.options.resource()).and_then(|provider| {
            let orchestrator =
                ScopeOrchestrator::new(&*provider, &self.options).with_stats(&self.stats);
            let guard = TimeoutGuard::from_options(&self.options);
            RetryPolicy::from_options(&self.options).run(|attempt| {
                self.stats.record_attempt();
                guard.run(|deadline| orchestrator.execute(ctx, deadline, attempt, &mut body))
            })
        });
        record_outcome(&self.stats, &result);
        result
    }

    /// Calls `body` as the root of a new call chain.
    pub fn call_root<T, F>(&self, body: F) -> TxResult<T>
    where
        F: FnMut(&Frame<P::Scope>) -> Result<T, Failure>,
    {
        self.call(&CallContext::new(), body)
    }
}

impl<P> Transactional<P> {
    /// The declared options.
    #[must_use]
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Counters for this wrapper.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// The registry this wrapper resolves its resource from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ScopeRegistry<P>> {
        &self.registry
    }
}

impl<P> fmt::Debug for Transactional<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transactional")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Async transactional wrapper.
pub struct AsyncTransactional<P> {
    registry: Arc<ScopeRegistry<P>>,
    options: TransactionOptions,
    stats: Arc<TransactionStats>,
}

impl<P: AsyncResourceProvider> AsyncTransactional<P> {
    /// Declares an async wrapper.
    ///
    /// Fails if `options` are configured for sync mode.
    pub fn new(registry: Arc<ScopeRegistry<P>>, options: TransactionOptions) -> TxResult<Self> {
        check_mode(&options, TransactionMode::Async)?;
        Ok(Self {
            registry,
            options,
            stats: Arc::new(TransactionStats::new()),
        })
    }

    /// Calls `body` inside the call chain of `ctx`.
    ///
    /// `body` is invoked once per attempt with a fresh [`Frame`].
    pub async fn call<T, F, Fut>(&self, ctx: &CallContext<P::Scope>, body: F) -> TxResult<T>
    where
        F: Fn(Frame<P::Scope>) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.stats.record_call();
        let result = match self.registry.get(self.options.resource()) {
            Ok(provider) => {
                let orchestrator =
                    ScopeOrchestrator::new(&*provider, &self.options).with_stats(&self.stats);
                let guard = TimeoutGuard::from_options(&self.options);
                let (orchestrator, guard, stats, body) =
                    (&orchestrator, &guard, &*self.stats, &body);
                RetryPolicy::from_options(&self.options)
                    .run_async(|attempt| {
                        stats.record_attempt();
                        guard.run_async(move |deadline| async move {
                            orchestrator
                                .execute_async(ctx, &deadline, attempt, body)
                                .await
                        })
                    })
                    .await
            }
            Err(err) => Err(err),
        };
        record_outcome(&self.stats, &result);
        result
    }

    /// Calls `body` as the root of a new call chain.
    pub async fn call_root<T, F, Fut>(&self, body: F) -> TxResult<T>
    where
        F: Fn(Frame<P::Scope>) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.call(&CallContext::new(), body).await
    }
}

impl<P> AsyncTransactional<P> {
    /// The declared options.
    #[must_use]
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Counters for this wrapper.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// The registry this wrapper resolves its resource from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ScopeRegistry<P>> {
        &self.registry
    }
}

impl<P> fmt::Debug for AsyncTransactional<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransactional")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
