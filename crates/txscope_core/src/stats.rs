//! Transaction statistics.
//!
//! Every wrapper owns a [`TransactionStats`]. Counters are atomic, so they can
//! be read while calls are in flight; [`TransactionStats::snapshot`] returns a
//! plain copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one wrapped callable.
#[derive(Debug, Default)]
pub struct TransactionStats {
    // Call counters
    /// Top-level invocations of the wrapper.
    calls: AtomicU64,
    /// Orchestrator runs, including retries.
    attempts: AtomicU64,

    // Scope lifecycle
    /// Scopes opened by this wrapper.
    scopes_opened: AtomicU64,
    /// Owned scopes committed.
    scopes_committed: AtomicU64,
    /// Owned scopes rolled back.
    scopes_rolled_back: AtomicU64,
    /// Calls that joined an enclosing scope.
    scopes_reused: AtomicU64,
    /// Calls that ran without any scope.
    unscoped_runs: AtomicU64,

    // Outcomes
    /// Calls rejected by the propagation policy.
    propagation_violations: AtomicU64,
    /// Calls that ended with a timeout.
    timeouts: AtomicU64,
    /// Calls that ended with any error.
    failures: AtomicU64,
}

impl TransactionStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open(&self) {
        self.scopes_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.scopes_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.scopes_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reuse(&self) {
        self.scopes_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unscoped(&self) {
        self.unscoped_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self) {
        self.propagation_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Top-level invocations.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Orchestrator runs, including retries.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Attempts beyond the first of each call.
    pub fn retries(&self) -> u64 {
        self.attempts().saturating_sub(self.calls())
    }

    /// Scopes opened.
    pub fn scopes_opened(&self) -> u64 {
        self.scopes_opened.load(Ordering::Relaxed)
    }

    /// Owned scopes committed.
    pub fn scopes_committed(&self) -> u64 {
        self.scopes_committed.load(Ordering::Relaxed)
    }

    /// Owned scopes rolled back.
    pub fn scopes_rolled_back(&self) -> u64 {
        self.scopes_rolled_back.load(Ordering::Relaxed)
    }

    /// Calls that joined an enclosing scope.
    pub fn scopes_reused(&self) -> u64 {
        self.scopes_reused.load(Ordering::Relaxed)
    }

    /// Calls that ran without a scope.
    pub fn unscoped_runs(&self) -> u64 {
        self.unscoped_runs.load(Ordering::Relaxed)
    }

    /// Calls rejected by the propagation policy.
    pub fn propagation_violations(&self) -> u64 {
        self.propagation_violations.load(Ordering::Relaxed)
    }

    /// Calls that timed out.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Calls that failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls(),
            attempts: self.attempts(),
            retries: self.retries(),
            scopes_opened: self.scopes_opened(),
            scopes_committed: self.scopes_committed(),
            scopes_rolled_back: self.scopes_rolled_back(),
            scopes_reused: self.scopes_reused(),
            unscoped_runs: self.unscoped_runs(),
            propagation_violations: self.propagation_violations(),
            timeouts: self.timeouts(),
            failures: self.failures(),
        }
    }
}

/// Point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Top-level invocations.
    pub calls: u64,
    /// Orchestrator runs, including retries.
    pub attempts: u64,
    /// Attempts beyond the first.
    pub retries: u64,
    /// Scopes opened.
    pub scopes_opened: u64,
    /// Owned scopes committed.
    pub scopes_committed: u64,
    /// Owned scopes rolled back.
    pub scopes_rolled_back: u64,
    /// Calls that joined an enclosing scope.
    pub scopes_reused: u64,
    /// Calls that ran without a scope.
    pub unscoped_runs: u64,
    /// Calls rejected by the propagation policy.
    pub propagation_violations: u64,
    /// Calls that timed out.
    pub timeouts: u64,
    /// Calls that failed.
    pub failures: u64,
}
