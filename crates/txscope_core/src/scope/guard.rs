//! Ownership guard for scopes opened by a frame.

use crate::provider::{AsyncScope, Scope};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Guard held by the frame that opened a scope.
///
/// The owning frame settles the scope (commit or rollback) and then calls
/// [`close`](Self::close). If the guard is dropped first, as happens on
/// panic or when an async call is cancelled, the scope is closed from `Drop`
/// so the provider can discard the unfinished work.
pub(crate) struct OwnedScope<S> {
    scope: Arc<S>,
    close_fn: fn(&S),
    settled: bool,
    closed: bool,
}

impl<S: Scope> OwnedScope<S> {
    /// Takes ownership of a scope opened by a blocking provider.
    pub(crate) fn blocking(scope: S) -> Self {
        Self::with_close(scope, <S as Scope>::close)
    }
}

impl<S: AsyncScope> OwnedScope<S> {
    /// Takes ownership of a scope opened by an async provider.
    pub(crate) fn task(scope: S) -> Self {
        Self::with_close(scope, <S as AsyncScope>::close)
    }
}

impl<S> OwnedScope<S> {
    fn with_close(scope: S, close_fn: fn(&S)) -> Self {
        Self {
            scope: Arc::new(scope),
            close_fn,
            settled: false,
            closed: false,
        }
    }

    /// Shared handle pushed onto the stack and handed to the body.
    pub(crate) fn handle(&self) -> &Arc<S> {
        &self.scope
    }

    /// Records that commit or rollback has run.
    pub(crate) fn mark_settled(&mut self) {
        self.settled = true;
    }

    /// Closes the scope.
    pub(crate) fn close(mut self) {
        self.close_once();
    }

    fn close_once(&mut self) {
        if !self.closed {
            self.closed = true;
            (self.close_fn)(&self.scope);
        }
    }
}

impl<S> Drop for OwnedScope<S> {
    fn drop(&mut self) {
        if !self.closed {
            if !self.settled {
                warn!("scope dropped before commit or rollback, closing");
            }
            self.close_once();
        }
    }
}

impl<S> fmt::Debug for OwnedScope<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedScope")
            .field("settled", &self.settled)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderResult;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counting {
        closes: AtomicU32,
    }

    impl Scope for Counting {
        fn commit(&self) -> ProviderResult<()> {
            Ok(())
        }

        fn rollback(&self) -> ProviderResult<()> {
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn explicit_close_runs_once() {
        let mut owned = OwnedScope::blocking(Counting::default());
        let handle = Arc::clone(owned.handle());
        owned.mark_settled();
        owned.close();
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_unsettled_scope() {
        let owned = OwnedScope::blocking(Counting::default());
        let handle = Arc::clone(owned.handle());
        drop(owned);
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    }
}
