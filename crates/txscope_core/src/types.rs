//! Core type definitions for txscope.

use std::fmt;
use std::str::FromStr;

use crate::error::TxError;

/// Identifier of one entry on a [`ScopeStack`](crate::ScopeStack).
///
/// Scope IDs are monotonically increasing and never reused within a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u64);

impl ScopeId {
    /// Creates a new scope ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.0)
    }
}

/// Policy governing how a call relates to an already-active scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Propagation {
    /// Join the current scope, or open one if none is active.
    #[default]
    Required,
    /// Always open a fresh scope; the current one stays on the stack untouched.
    RequiresNew,
    /// Reserved. Not wired into the decision table.
    Nested,
    /// Join the current scope if present, otherwise run without one.
    Supports,
    /// Reserved. Not wired into the decision table.
    NotSupported,
    /// Fail if a scope is active, otherwise run without one.
    Never,
    /// Join the current scope, fail if none is active.
    Mandatory,
}

impl Propagation {
    /// All propagation modes, including the reserved ones.
    pub const ALL: [Propagation; 7] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Nested,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Never,
        Propagation::Mandatory,
    ];

    /// The modes the decision table implements.
    pub const IMPLEMENTED: [Propagation; 5] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::Never,
        Propagation::Mandatory,
    ];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Nested => "NESTED",
            Propagation::Supports => "SUPPORTS",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Never => "NEVER",
            Propagation::Mandatory => "MANDATORY",
        }
    }

    /// Returns true for the reserved modes that have no decision-table entry.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Propagation::Nested | Propagation::NotSupported)
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Propagation::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TxError::configuration(format!("invalid propagation type: {s}")))
    }
}

/// Scheduling mode of a wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
    /// Blocking call on the caller's thread.
    #[default]
    Sync,
    /// Future-returning call driven by an async runtime.
    Async,
}

impl TransactionMode {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransactionMode::Sync => "SYNC",
            TransactionMode::Async => "ASYNC",
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SYNC" => Ok(TransactionMode::Sync),
            "ASYNC" => Ok(TransactionMode::Async),
            _ => Err(TxError::configuration(format!(
                "invalid transaction mode: {s}"
            ))),
        }
    }
}
