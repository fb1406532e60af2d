//! # txscope Core
//!
//! Transaction-scope propagation engine.
//!
//! This crate provides:
//! - Propagation decision table (REQUIRED, REQUIRES_NEW, SUPPORTS, NEVER, MANDATORY)
//! - Per-call-chain scope stack with RAII cleanup
//! - Scope orchestration for blocking and async resource providers
//! - Bounded retry with flat backoff on classified failures
//! - Deadlines with cooperative (blocking) and racing (async) cancellation
//! - Named resource registry
//! - Declarative wrappers composing all of the above
//!
//! ## Architecture
//!
//! ```text
//! Transactional / AsyncTransactional
//!   -> ScopeRegistry::get(resource)
//!   -> RetryPolicy (one orchestrator run per attempt)
//!   -> TimeoutGuard (fresh deadline per attempt)
//!   -> ScopeOrchestrator (decide, open/reuse/skip/reject, settle, pop)
//!   -> user body (receives a Frame)
//! ```
//!
//! ## Key Invariants
//!
//! - Only the frame that opened a scope commits or rolls it back
//! - An owned scope is closed exactly once on every exit path
//! - Every stack entry is popped by the frame that pushed it
//! - Call chains never observe each other's scopes
//! - A frame only joins scopes held by its own enclosing frames
//! - Propagation violations and configuration errors are never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod error;
mod options;
mod orchestrator;
mod policy;
mod provider;
mod registry;
mod retry;
mod scope;
mod stats;
mod timeout;
mod transactional;
mod types;

pub use context::{CallContext, Frame};
pub use error::{
    BoxError, ErrorCode, Failure, FailureClass, FailureContext, ProviderError, ProviderResult,
    TxError, TxResult,
};
pub use options::{
    RollbackRules, TransactionOptions, TransactionOptionsBuilder, DEFAULT_RESOURCE,
    DEFAULT_RETRY_BACKOFF,
};
pub use orchestrator::ScopeOrchestrator;
pub use policy::{decide, Action, RejectReason};
pub use provider::{AsyncResourceProvider, AsyncScope, ResourceProvider, Scope};
pub use registry::ScopeRegistry;
pub use retry::RetryPolicy;
pub use scope::{ScopeStack, StackEntry};
pub use stats::{StatsSnapshot, TransactionStats};
pub use timeout::{Deadline, TimeoutGuard};
pub use transactional::{AsyncTransactional, Transactional};
pub use types::{Propagation, ScopeId, TransactionMode};

/// Re-exported so providers can implement the async traits without a direct
/// dependency.
pub use async_trait::async_trait;
