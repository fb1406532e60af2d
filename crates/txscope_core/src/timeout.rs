//! Deadlines and the timeout guard.
//!
//! A [`TimeoutGuard`] arms a fresh [`Deadline`] for every attempt of a
//! wrapped call, so a retried attempt gets the full timeout again. The deadline is
//! the cancellation signal: the async orchestrator races provider calls and
//! the body against it, and blocking code observes it at checkpoints
//! ([`Deadline::check`], [`Deadline::sleep`]). Cleanup (rollback, close, stack
//! pop) always runs after the race is lost.
//!
//! No timer thread or background task is created. The only timers are
//! `tokio::time::Sleep` futures owned by the racing call, so nothing outlives
//! the attempt that armed them.

use crate::error::{Failure, TxResult};
use crate::options::TransactionOptions;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Point in time after which a call is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    timeout: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            timeout: None,
            expires_at: None,
        }
    }

    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            expires_at: Instant::now().checked_add(timeout),
        }
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// When the deadline expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry, `None` if unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The failure reported when this deadline expires.
    #[must_use]
    pub fn failure(&self) -> Failure {
        Failure::timeout(self.timeout.unwrap_or_default())
    }

    /// Fails if the deadline has passed.
    pub fn check(&self) -> Result<(), Failure> {
        if self.is_expired() {
            Err(self.failure())
        } else {
            Ok(())
        }
    }

    /// Blocks for `duration`, or until the deadline if that comes first.
    ///
    /// Returns a timeout failure if the deadline cut the sleep short.
    pub fn sleep(&self, duration: Duration) -> Result<(), Failure> {
        match self.remaining() {
            Some(left) if left <= duration => {
                std::thread::sleep(left);
                Err(self.failure())
            }
            _ => {
                std::thread::sleep(duration);
                Ok(())
            }
        }
    }

    /// Async counterpart of [`sleep`](Self::sleep).
    pub async fn sleep_async(&self, duration: Duration) -> Result<(), Failure> {
        self.race(tokio::time::sleep(duration)).await
    }

    /// Completes when the deadline expires; never completes if unbounded.
    pub async fn expired(&self) {
        match self.expires_at {
            Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
            None => std::future::pending().await,
        }
    }

    /// Runs `fut` until it completes or the deadline expires.
    ///
    /// On expiry `fut` is dropped, which cancels it at its current suspension
    /// point. Completion wins ties.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, Failure>
    where
        F: Future<Output = T>,
    {
        if self.expires_at.is_none() {
            return Ok(fut.await);
        }
        tokio::select! {
            biased;
            out = fut => Ok(out),
            () = self.expired() => Err(self.failure()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// Arms a deadline around a wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutGuard {
    timeout: Option<Duration>,
}

impl TimeoutGuard {
    /// Creates a guard; `None` disables the deadline.
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Creates a guard from transaction options.
    #[must_use]
    pub fn from_options(options: &TransactionOptions) -> Self {
        Self::new(options.timeout())
    }

    /// Returns a fresh deadline starting now.
    #[must_use]
    pub fn arm(&self) -> Deadline {
        match self.timeout {
            Some(timeout) => Deadline::after(timeout),
            None => Deadline::none(),
        }
    }

    /// Runs one blocking attempt under a freshly armed deadline.
    pub fn run<T>(&self, op: impl FnOnce(&Deadline) -> TxResult<T>) -> TxResult<T> {
        let deadline = self.arm();
        let result = op(&deadline);
        self.report(&deadline, &result);
        result
    }

    /// Runs one async attempt under a freshly armed deadline.
    pub async fn run_async<T, F, Fut>(&self, op: F) -> TxResult<T>
    where
        F: FnOnce(Deadline) -> Fut,
        Fut: Future<Output = TxResult<T>>,
    {
        let deadline = self.arm();
        let result = op(deadline).await;
        self.report(&deadline, &result);
        result
    }

    fn report<T>(&self, deadline: &Deadline, result: &TxResult<T>) {
        if let Err(err) = result {
            if err.is_timeout() {
                warn!(
                    timeout_ms = deadline.timeout().unwrap_or_default().as_millis() as u64,
                    "transaction deadline expired"
                );
            }
        }
    }
}
