//! Async in-memory resource provider.
//!
//! Same storage and journal as [`MemoryProvider`](crate::MemoryProvider),
//! with an optional latency injected at every async provider call so tests
//! can exercise suspension points and cancellation.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use txscope_core::{async_trait, AsyncResourceProvider, AsyncScope, ProviderResult};

use crate::journal::Journal;
use crate::memory::{MemoryProvider, MemoryScope, ProviderState};

/// Async provider backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct AsyncMemoryProvider {
    inner: MemoryProvider,
    latency: Option<Duration>,
}

impl AsyncMemoryProvider {
    /// Creates an empty provider with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` inside open, commit and rollback.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The event journal.
    pub fn journal(&self) -> &Journal {
        self.inner.journal()
    }

    /// Blocking view over the same state, for assertions and failure injection.
    pub fn memory(&self) -> &MemoryProvider {
        &self.inner
    }

    fn state(&self) -> &Arc<ProviderState> {
        &self.inner.state
    }

    async fn pause(latency: Option<Duration>) {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Deref for AsyncMemoryProvider {
    type Target = MemoryProvider;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl AsyncResourceProvider for AsyncMemoryProvider {
    type Scope = AsyncMemoryScope;

    async fn open_scope(
        &self,
        read_only: bool,
        isolation_level: Option<&str>,
    ) -> ProviderResult<AsyncMemoryScope> {
        Self::pause(self.latency).await;
        let inner = self.state().open(read_only, isolation_level)?;
        Ok(AsyncMemoryScope {
            inner,
            latency: self.latency,
        })
    }
}

/// A scope opened by an async memory provider.
#[derive(Debug)]
pub struct AsyncMemoryScope {
    inner: MemoryScope,
    latency: Option<Duration>,
}

impl Deref for AsyncMemoryScope {
    type Target = MemoryScope;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl AsyncScope for AsyncMemoryScope {
    async fn commit(&self) -> ProviderResult<()> {
        AsyncMemoryProvider::pause(self.latency).await;
        self.inner.commit_now()
    }

    async fn rollback(&self) -> ProviderResult<()> {
        AsyncMemoryProvider::pause(self.latency).await;
        self.inner.rollback_now()
    }

    fn close(&self) {
        self.inner.close_now();
    }
}
