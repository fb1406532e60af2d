//! Resource provider seam.
//!
//! The engine never talks to a database directly. It consumes a provider that
//! can open a transactional scope, and scopes that can be committed, rolled
//! back and closed. Blocking and async flavours share the same contract:
//!
//! - `open_scope` either returns a scope or fails with [`ProviderError`]
//! - a scope is finished by exactly one of `commit` or `rollback`
//! - `close` always follows, is idempotent, and never fails observably
//!
//! `close` is synchronous in both flavours so it can run from `Drop` when a
//! call is cancelled or unwinds. Providers are expected to discard any
//! unfinished work when a scope is closed without commit.
//!
//! [`ProviderError`]: crate::ProviderError

use crate::error::ProviderResult;
use async_trait::async_trait;

/// A transactional unit of work opened by a [`ResourceProvider`].
pub trait Scope: Send + Sync + 'static {
    /// Commits the unit of work.
    fn commit(&self) -> ProviderResult<()>;

    /// Rolls back the unit of work.
    fn rollback(&self) -> ProviderResult<()>;

    /// Releases the scope. Idempotent.
    ///
    /// Closing a scope that was never committed must discard its pending
    /// work. A frame unwinding from a panic closes its scope this way.
    fn close(&self);
}

/// A blocking resource provider.
pub trait ResourceProvider: Send + Sync + 'static {
    /// The scope type this provider opens.
    type Scope: Scope;

    /// Opens a new scope configured with the given settings.
    fn open_scope(&self, read_only: bool, isolation_level: Option<&str>)
        -> ProviderResult<Self::Scope>;
}

/// A transactional unit of work opened by an [`AsyncResourceProvider`].
#[async_trait]
pub trait AsyncScope: Send + Sync + 'static {
    /// Commits the unit of work.
    async fn commit(&self) -> ProviderResult<()>;

    /// Rolls back the unit of work.
    async fn rollback(&self) -> ProviderResult<()>;

    /// Releases the scope. Idempotent.
    ///
    /// Closing a scope that was never committed must discard its pending
    /// work. This is the only cleanup an owning frame can run when its call
    /// future is dropped mid-flight, since no rollback can be awaited from
    /// `Drop`.
    fn close(&self);
}

/// An async resource provider.
#[async_trait]
pub trait AsyncResourceProvider: Send + Sync + 'static {
    /// The scope type this provider opens.
    type Scope: AsyncScope;

    /// Opens a new scope configured with the given settings.
    async fn open_scope(
        &self,
        read_only: bool,
        isolation_level: Option<&str>,
    ) -> ProviderResult<Self::Scope>;
}
