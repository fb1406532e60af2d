//! Scope orchestration.
//!
//! The orchestrator runs one attempt of a wrapped call:
//!
//! 1. look up the current scope of the call chain
//! 2. ask [`decide`] what to do
//! 3. act on the decision
//!
//! | action                  | behaviour                                             |
//! |-------------------------|-------------------------------------------------------|
//! | `Reuse`                 | push the enclosing scope under a fresh id, run, pop    |
//! | `CreateNew`             | open, push, run, commit or roll back, close, pop      |
//! | `ProceedWithoutScope`   | run with no scope                                     |
//! | `Reject`                | fail with a propagation violation, body never runs    |
//!
//! A reusing frame never commits or rolls back; only the frame that opened a
//! scope settles it. Stack entries are popped by RAII guards and owned scopes
//! are closed by [`OwnedScope`](crate::scope::OwnedScope), so cleanup happens
//! on every exit path including panics and cancelled futures.
//!
//! Two executors share this type: [`ScopeOrchestrator::execute`] for blocking
//! providers and [`ScopeOrchestrator::execute_async`] for async providers.

mod blocking;
mod task;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::CallContext;
use crate::error::{Failure, FailureClass, FailureContext, TxError};
use crate::options::TransactionOptions;
use crate::policy::{decide, Action, RejectReason};
use crate::stats::TransactionStats;
use crate::timeout::Deadline;

/// Executes the propagation state machine for one attempt.
pub struct ScopeOrchestrator<'a, P> {
    provider: &'a P,
    options: &'a TransactionOptions,
    stats: Option<&'a TransactionStats>,
}

impl<'a, P> ScopeOrchestrator<'a, P> {
    /// Creates an orchestrator for `provider` configured by `options`.
    #[must_use]
    pub fn new(provider: &'a P, options: &'a TransactionOptions) -> Self {
        Self {
            provider,
            options,
            stats: None,
        }
    }

    /// Records scope lifecycle events into `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: &'a TransactionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The options this orchestrator applies.
    #[must_use]
    pub fn options(&self) -> &TransactionOptions {
        self.options
    }

    fn record(&self, f: impl FnOnce(&TransactionStats)) {
        if let Some(stats) = self.stats {
            f(stats);
        }
    }

    fn plan<S>(&self, ctx: &CallContext<S>, attempt: u32) -> Action<Arc<S>> {
        let propagation = self.options.propagation();
        let action = decide(ctx.current(), propagation);
        debug!(
            %propagation,
            action = action.label(),
            depth = ctx.depth(),
            attempt,
            "propagation decision"
        );
        action
    }

    fn reject(&self, reason: RejectReason) -> TxError {
        self.record(TransactionStats::record_violation);
        TxError::PropagationViolation {
            propagation: self.options.propagation(),
            reason,
        }
    }

    /// Wraps a failure that escaped this frame.
    ///
    /// A timeout failure becomes [`TxError::Timeout`] only when this call's
    /// own deadline has expired; a timeout bubbling up from a nested call
    /// with its own deadline stays a classified failure.
    fn surface(&self, deadline: &Deadline, failure: Failure, scope_open: bool) -> TxError {
        let context = FailureContext::new(self.options.propagation(), scope_open);
        if failure.class() == &FailureClass::Timeout && deadline.is_expired() {
            return TxError::Timeout {
                timeout: deadline.timeout().unwrap_or_default(),
                context,
            };
        }
        TxError::Failed {
            source: failure,
            context,
        }
    }
}

impl<P> fmt::Debug for ScopeOrchestrator<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeOrchestrator")
            .field("options", &self.options)
            .field("stats", &self.stats.is_some())
            .finish_non_exhaustive()
    }
}
