//! Bounded retry with flat backoff.
//!
//! Each attempt is a complete run under its own deadline, so a retried
//! attempt gets a fresh propagation decision, a fresh timeout and, for
//! created scopes, a brand-new scope.
//!
//! Classification works on the [`FailureClass`] carried by the error:
//!
//! - errors without a class (configuration, registry, propagation violation)
//!   are surfaced immediately
//! - a class not covered by `rollback_for` is surfaced unchanged
//! - a covered class, timeouts included, is retried while attempts remain
//! - on exhaustion, provider failures are wrapped as [`TxError::Database`];
//!   everything else is surfaced unchanged

use std::future::Future;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{FailureClass, TxError, TxResult};
use crate::options::{RollbackRules, TransactionOptions};

/// Retry configuration for a wrapped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    backoff: Duration,
    rules: RollbackRules,
}

enum Step {
    Retry,
    Stop(TxError),
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(retry_count: u32, backoff: Duration, rules: RollbackRules) -> Self {
        Self {
            retry_count,
            backoff,
            rules,
        }
    }

    /// Creates a policy from transaction options.
    #[must_use]
    pub fn from_options(options: &TransactionOptions) -> Self {
        Self::new(
            options.retry_count(),
            options.retry_backoff(),
            options.rollback_for().clone(),
        )
    }

    /// Total number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Delay between attempts.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Returns true if `err` is covered by the rollback rules.
    #[must_use]
    pub fn is_retryable(&self, err: &TxError) -> bool {
        err.failure_class()
            .is_some_and(|class| self.rules.matches(&class))
    }

    /// Runs a blocking operation, retrying classified failures.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub fn run<T>(&self, mut attempt: impl FnMut(u32) -> TxResult<T>) -> TxResult<T> {
        let mut n = 1;
        loop {
            let err = match attempt(n) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match self.next_step(err, n) {
                Step::Stop(err) => return Err(err),
                Step::Retry => thread::sleep(self.backoff),
            }
            n += 1;
        }
    }

    /// Runs an async operation, retrying classified failures.
    pub async fn run_async<T, F, Fut>(&self, mut attempt: F) -> TxResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = TxResult<T>>,
    {
        let mut n = 1;
        loop {
            let err = match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match self.next_step(err, n) {
                Step::Stop(err) => return Err(err),
                Step::Retry => tokio::time::sleep(self.backoff).await,
            }
            n += 1;
        }
    }

    fn next_step(&self, err: TxError, attempts: u32) -> Step {
        let err = err.with_attempts(attempts);
        let Some(class) = err.failure_class() else {
            return Step::Stop(err);
        };
        if !self.rules.matches(&class) {
            return Step::Stop(err);
        }

        let remaining = self.max_attempts().saturating_sub(attempts);
        if remaining == 0 {
            return Step::Stop(Self::exhausted(err, &class));
        }

        warn!(
            error = %err,
            retry_remaining = remaining,
            failure_class = %class,
            "transaction failed, retrying"
        );
        Step::Retry
    }

    fn exhausted(err: TxError, class: &FailureClass) -> TxError {
        error!(error = %err, failure_class = %class, "transaction failed");
        match err {
            TxError::Failed { source, context } if source.class() == &FailureClass::Provider => {
                TxError::Database { source, context }
            }
            other => other,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&TransactionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, Failure, FailureContext};
    use crate::types::Propagation;
    use std::cell::Cell;

    fn failed(class: FailureClass) -> TxError {
        TxError::Failed {
            source: Failure::new(class, "boom"),
            context: FailureContext::new(Propagation::Required, true),
        }
    }

    fn policy(retries: u32, rules: RollbackRules) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1), rules)
    }

    #[test]
    fn succeeds_first_time() {
        let calls = Cell::new(0);
        let result = policy(3, RollbackRules::all()).run(|_| {
            calls.set(calls.get() + 1);
            Ok("ok")
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_until_success() {
        let result = policy(2, RollbackRules::all()).run(|n| {
            if n < 3 {
                Err(failed(FailureClass::Provider))
            } else {
                Ok(n)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn exhausted_provider_failure_becomes_database_error() {
        let calls = Cell::new(0);
        let err = policy(2, RollbackRules::all())
            .run(|_| -> TxResult<()> {
                calls.set(calls.get() + 1);
                Err(failed(FailureClass::Provider))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.code(), ErrorCode::Database);
        assert_eq!(err.context().unwrap().attempts, 3);
    }

    #[test]
    fn exhausted_application_failure_is_unchanged() {
        let err = policy(1, RollbackRules::all())
            .run(|_| -> TxResult<()> {
                Err(failed(FailureClass::application("conflict")))
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransactionFailed);
        assert_eq!(
            err.failure_class(),
            Some(FailureClass::application("conflict"))
        );
        assert_eq!(err.context().unwrap().attempts, 2);
    }

    #[test]
    fn unmatched_class_is_not_retried() {
        let calls = Cell::new(0);
        let err = policy(5, RollbackRules::only([FailureClass::Provider]))
            .run(|_| -> TxResult<()> {
                calls.set(calls.get() + 1);
                Err(failed(FailureClass::application("validation")))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert_eq!(err.code(), ErrorCode::TransactionFailed);
    }

    #[test]
    fn violations_are_never_retried() {
        let calls = Cell::new(0);
        let err = policy(5, RollbackRules::all())
            .run(|_| -> TxResult<()> {
                calls.set(calls.get() + 1);
                Err(TxError::PropagationViolation {
                    propagation: Propagation::Mandatory,
                    reason: crate::policy::RejectReason::ScopeRequired,
                })
            })
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(err.is_propagation_violation());
    }

    #[test]
    fn timeouts_are_retried_when_covered() {
        let calls = Cell::new(0);
        let result = policy(2, RollbackRules::only([FailureClass::Timeout])).run(|n| {
            calls.set(calls.get() + 1);
            if n == 1 {
                Err(TxError::Timeout {
                    timeout: Duration::from_millis(5),
                    context: FailureContext::new(Propagation::Required, false),
                })
            } else {
                Ok(n)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn exhausted_timeout_stays_a_timeout() {
        let err = policy(1, RollbackRules::all())
            .run(|_| -> TxResult<()> {
                Err(TxError::Timeout {
                    timeout: Duration::from_millis(5),
                    context: FailureContext::new(Propagation::Required, true),
                })
            })
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.context().unwrap().attempts, 2);
    }

    #[test]
    fn default_policy_has_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn async_retries_until_success() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = policy(2, RollbackRules::all())
            .run_async(|n| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(failed(FailureClass::Provider))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
