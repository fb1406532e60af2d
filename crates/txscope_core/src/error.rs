//! Error types for txscope.
//!
//! Two layers of errors exist:
//!
//! - [`Failure`] is what user bodies and resource providers produce. It carries
//!   an explicit [`FailureClass`] tag that the retry loop inspects.
//! - [`TxError`] is what a wrapped call surfaces to its caller. Failures that
//!   escaped a scope are wrapped with a [`FailureContext`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::policy::RejectReason;
use crate::types::Propagation;

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TxError>;

/// Result type for resource provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed error used as an opaque cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a resource provider.
#[derive(Debug, Error)]
#[error("provider error: {message}")]
pub struct ProviderError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ProviderError {
    /// Creates a provider error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Classification tag carried by every [`Failure`].
///
/// `rollback_for` rules are expressed as sets of these classes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureClass {
    /// The resource provider failed (open, commit or rollback).
    Provider,
    /// A deadline expired.
    Timeout,
    /// A nested wrapped call failed for a reason other than provider or timeout.
    Transaction,
    /// An application-defined failure class.
    Application(Cow<'static, str>),
}

impl FailureClass {
    /// Creates an application-defined class.
    pub fn application(name: impl Into<Cow<'static, str>>) -> Self {
        FailureClass::Application(name.into())
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            FailureClass::Provider => "provider",
            FailureClass::Timeout => "timeout",
            FailureClass::Transaction => "transaction",
            FailureClass::Application(name) => name,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FailureClass {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name {
            "" => Err(TxError::configuration("failure class name is empty")),
            "provider" => Ok(FailureClass::Provider),
            "timeout" => Ok(FailureClass::Timeout),
            "transaction" => Ok(FailureClass::Transaction),
            other => Ok(FailureClass::Application(Cow::Owned(other.to_string()))),
        }
    }
}

/// A classified failure raised inside a scope.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Failure {
    class: FailureClass,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Failure {
    /// Creates a failure of the given class.
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an application failure tagged with `class`.
    pub fn application(class: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(FailureClass::application(class), message)
    }

    /// Creates a timeout failure for a deadline of `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            FailureClass::Timeout,
            format!("transaction timed out after {timeout:?}"),
        )
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the failure class.
    #[must_use]
    pub fn class(&self) -> &FailureClass {
        &self.class
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ProviderError> for Failure {
    fn from(err: ProviderError) -> Self {
        Failure::new(FailureClass::Provider, err.message.clone()).with_source(err)
    }
}

impl From<TxError> for Failure {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Failed { source, .. } => source,
            TxError::Database { .. } => {
                Failure::new(FailureClass::Provider, err.to_string()).with_source(err)
            }
            TxError::Timeout { .. } => {
                Failure::new(FailureClass::Timeout, err.to_string()).with_source(err)
            }
            other => Failure::new(FailureClass::Transaction, other.to_string()).with_source(other),
        }
    }
}

/// Structured context attached to failures that escaped a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureContext {
    /// Number of attempts made, including the failing one.
    pub attempts: u32,
    /// Propagation mode of the failing call.
    pub propagation: Propagation,
    /// Whether the failing frame had a scope at the time of failure.
    pub scope_open: bool,
}

impl FailureContext {
    /// Creates a context for a single attempt.
    #[must_use]
    pub const fn new(propagation: Propagation, scope_open: bool) -> Self {
        Self {
            attempts: 1,
            propagation,
            scope_open,
        }
    }
}

/// Stable error codes for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid options or registration.
    Configuration,
    /// A propagation rule rejected the call.
    PropagationViolation,
    /// A named resource does not exist.
    NotFound,
    /// The resource provider failed after all retries.
    Database,
    /// A deadline expired.
    Timeout,
    /// The user body failed.
    TransactionFailed,
}

impl ErrorCode {
    /// Returns the canonical code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Configuration => "CONFIGURATION_ERROR",
            ErrorCode::PropagationViolation => "PROPAGATION_VIOLATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Database => "DATABASE_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::TransactionFailed => "TRANSACTION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by wrapped transactional calls.
#[derive(Debug, Error)]
pub enum TxError {
    /// Invalid transaction options.
    #[error("invalid transaction options: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The propagation policy rejected the call.
    #[error("propagation violation ({propagation}): {reason}")]
    PropagationViolation {
        /// Propagation mode of the rejected call.
        propagation: Propagation,
        /// Why the call was rejected.
        reason: RejectReason,
    },

    /// No resource is registered under the name.
    #[error("resource '{name}' not registered")]
    ResourceNotRegistered {
        /// The requested name.
        name: String,
    },

    /// A resource is already registered under the name.
    #[error("resource '{name}' already registered")]
    ResourceAlreadyRegistered {
        /// The conflicting name.
        name: String,
    },

    /// The resource provider failed and retries are exhausted.
    #[error("database error after {} attempt(s): {source}", .context.attempts)]
    Database {
        /// The last provider failure.
        source: Failure,
        /// Where and when it failed.
        context: FailureContext,
    },

    /// The call's deadline expired.
    #[error("transaction timed out after {timeout:?}")]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
        /// Where and when it expired.
        context: FailureContext,
    },

    /// The body failed; the original failure is preserved unchanged.
    #[error("transaction failed after {} attempt(s): {source}", .context.attempts)]
    Failed {
        /// The original failure.
        source: Failure,
        /// Where and when it failed.
        context: FailureContext,
    },
}

impl TxError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a not-registered error.
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::ResourceNotRegistered { name: name.into() }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            TxError::Configuration { .. } | TxError::ResourceAlreadyRegistered { .. } => {
                ErrorCode::Configuration
            }
            TxError::PropagationViolation { .. } => ErrorCode::PropagationViolation,
            TxError::ResourceNotRegistered { .. } => ErrorCode::NotFound,
            TxError::Database { .. } => ErrorCode::Database,
            TxError::Timeout { .. } => ErrorCode::Timeout,
            TxError::Failed { .. } => ErrorCode::TransactionFailed,
        }
    }

    /// Returns the failure class used by retry classification.
    ///
    /// Configuration, registry and propagation errors have no class and are
    /// never retried.
    #[must_use]
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            TxError::Failed { source, .. } => Some(source.class().clone()),
            TxError::Database { .. } => Some(FailureClass::Provider),
            TxError::Timeout { .. } => Some(FailureClass::Timeout),
            _ => None,
        }
    }

    /// Returns the failure context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            TxError::Database { context, .. }
            | TxError::Timeout { context, .. }
            | TxError::Failed { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns true if this is a propagation violation.
    #[must_use]
    pub fn is_propagation_violation(&self) -> bool {
        matches!(self, TxError::PropagationViolation { .. })
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TxError::Timeout { .. })
    }

    /// Records the attempt count on errors that carry a context.
    #[must_use]
    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        match &mut self {
            TxError::Database { context, .. }
            | TxError::Timeout { context, .. }
            | TxError::Failed { context, .. } => context.attempts = attempts,
            _ => {}
        }
        self
    }

    /// Structured key/value details for logging and reporting.
    #[must_use]
    pub fn details(&self) -> Vec<(&'static str, String)> {
        let mut details = vec![
            ("code", self.code().to_string()),
            ("message", self.to_string()),
        ];
        if let Some(class) = self.failure_class() {
            details.push(("failure_class", class.to_string()));
        }
        if let Some(ctx) = self.context() {
            details.push(("attempts", ctx.attempts.to_string()));
            details.push(("propagation", ctx.propagation.to_string()));
            details.push(("scope_open", ctx.scope_open.to_string()));
        }
        if let TxError::Database { source, .. } | TxError::Failed { source, .. } = self {
            details.push(("cause", source.message().to_string()));
        }
        details
    }
}
