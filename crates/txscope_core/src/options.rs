//! Transaction options.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{FailureClass, TxError, TxResult};
use crate::types::{Propagation, TransactionMode};

/// Name of the resource used when none is configured.
pub const DEFAULT_RESOURCE: &str = "default";

/// Default delay between retry attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Which failure classes trigger rollback followed by a retry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RollbackRules {
    /// Every classified failure.
    #[default]
    All,
    /// Only the listed classes.
    Only(BTreeSet<FailureClass>),
}

impl RollbackRules {
    /// Matches every failure class.
    #[must_use]
    pub fn all() -> Self {
        RollbackRules::All
    }

    /// Matches only the given classes.
    pub fn only(classes: impl IntoIterator<Item = FailureClass>) -> Self {
        RollbackRules::Only(classes.into_iter().collect())
    }

    /// Matches nothing; failures are never retried.
    #[must_use]
    pub fn none() -> Self {
        RollbackRules::Only(BTreeSet::new())
    }

    /// Returns true if `class` is covered by these rules.
    #[must_use]
    pub fn matches(&self, class: &FailureClass) -> bool {
        match self {
            RollbackRules::All => true,
            RollbackRules::Only(classes) => classes.contains(class),
        }
    }
}

/// Immutable configuration of a transactional call.
///
/// Built through [`TransactionOptions::builder`]; all validation happens in
/// [`TransactionOptionsBuilder::build`], never at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    resource: String,
    mode: TransactionMode,
    read_only: bool,
    isolation_level: Option<String>,
    propagation: Propagation,
    timeout: Option<Duration>,
    retry_count: u32,
    retry_backoff: Duration,
    rollback_for: RollbackRules,
}

impl TransactionOptions {
    /// Starts building options from the defaults.
    #[must_use]
    pub fn builder() -> TransactionOptionsBuilder {
        TransactionOptionsBuilder::default()
    }

    /// Name of the registered resource to use.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Scheduling mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Whether new scopes are opened read-only.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Isolation level applied to new scopes.
    #[must_use]
    pub fn isolation_level(&self) -> Option<&str> {
        self.isolation_level.as_deref()
    }

    /// Propagation mode.
    #[must_use]
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Deadline applied to each attempt.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Flat delay between attempts.
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Failure classes that trigger rollback and retry.
    #[must_use]
    pub fn rollback_for(&self) -> &RollbackRules {
        &self.rollback_for
    }

    /// Returns a builder pre-filled with these options.
    #[must_use]
    pub fn to_builder(&self) -> TransactionOptionsBuilder {
        TransactionOptionsBuilder {
            resource: self.resource.clone(),
            mode: self.mode,
            read_only: self.read_only,
            isolation_level: self.isolation_level.clone(),
            propagation: self.propagation,
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
            rollback_for: self.rollback_for.clone(),
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        let b = TransactionOptionsBuilder::default();
        Self {
            resource: b.resource,
            mode: b.mode,
            read_only: b.read_only,
            isolation_level: b.isolation_level,
            propagation: b.propagation,
            timeout: b.timeout,
            retry_count: b.retry_count,
            retry_backoff: b.retry_backoff,
            rollback_for: b.rollback_for,
        }
    }
}

/// Builder for [`TransactionOptions`].
#[derive(Debug, Clone)]
pub struct TransactionOptionsBuilder {
    resource: String,
    mode: TransactionMode,
    read_only: bool,
    isolation_level: Option<String>,
    propagation: Propagation,
    timeout: Option<Duration>,
    retry_count: u32,
    retry_backoff: Duration,
    rollback_for: RollbackRules,
}

impl Default for TransactionOptionsBuilder {
    fn default() -> Self {
        Self {
            resource: DEFAULT_RESOURCE.to_string(),
            mode: TransactionMode::Sync,
            read_only: false,
            isolation_level: None,
            propagation: Propagation::Required,
            timeout: None,
            retry_count: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            rollback_for: RollbackRules::All,
        }
    }
}

impl TransactionOptionsBuilder {
    /// Sets the registered resource name.
    #[must_use]
    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resource = name.into();
        self
    }

    /// Sets the scheduling mode.
    #[must_use]
    pub fn mode(mut self, mode: TransactionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets read-only mode for new scopes.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the isolation level for new scopes.
    #[must_use]
    pub fn isolation_level(mut self, level: impl Into<String>) -> Self {
        self.isolation_level = Some(level.into());
        self
    }

    /// Sets the propagation mode.
    #[must_use]
    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the flat delay between attempts.
    #[must_use]
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets which failure classes trigger rollback and retry.
    #[must_use]
    pub fn rollback_for(mut self, rules: RollbackRules) -> Self {
        self.rollback_for = rules;
        self
    }

    /// Validates and builds the options.
    pub fn build(self) -> TxResult<TransactionOptions> {
        if self.resource.trim().is_empty() {
            return Err(TxError::configuration("resource name must not be empty"));
        }
        if self.retry_backoff.is_zero() {
            return Err(TxError::configuration("retry_backoff must be positive"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(TxError::configuration("timeout must be positive"));
        }
        if self
            .isolation_level
            .as_deref()
            .is_some_and(|level| level.trim().is_empty())
        {
            return Err(TxError::configuration("isolation_level must not be empty"));
        }
        if self.propagation.is_reserved() {
            return Err(TxError::configuration(format!(
                "propagation {} is reserved and not supported",
                self.propagation
            )));
        }

        Ok(TransactionOptions {
            resource: self.resource,
            mode: self.mode,
            read_only: self.read_only,
            isolation_level: self.isolation_level,
            propagation: self.propagation,
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
            rollback_for: self.rollback_for,
        })
    }
}
