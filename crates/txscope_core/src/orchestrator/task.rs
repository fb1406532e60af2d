use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ScopeOrchestrator;
use crate::context::{CallContext, Frame};
use crate::error::{Failure, TxResult};
use crate::policy::Action;
use crate::provider::{AsyncResourceProvider, AsyncScope};
use crate::scope::OwnedScope;
use crate::stats::TransactionStats;
use crate::timeout::Deadline;

impl<P: AsyncResourceProvider> ScopeOrchestrator<'_, P> {
    /// Runs one attempt of an async body.
    ///
    /// Opening the scope, the body and the commit are each raced against
    /// `deadline`. When the deadline wins, the in-flight future is dropped and
    /// rollback, close and stack pop still run before the timeout is
    /// returned.
    pub async fn execute_async<T, F, Fut>(
        &self,
        ctx: &CallContext<P::Scope>,
        deadline: &Deadline,
        attempt: u32,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce(Frame<P::Scope>) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        match self.plan(ctx, attempt) {
            Action::Reject(reason) => Err(self.reject(reason)),
            Action::ProceedWithoutScope => {
                self.record(TransactionStats::record_unscoped);
                let frame = Frame::new(None, false, ctx.clone(), *deadline, attempt);
                flatten(deadline.race(body(frame)).await)
                    .map_err(|failure| self.surface(deadline, failure, false))
            }
            Action::Reuse(scope) => {
                self.record(TransactionStats::record_reuse);
                let entry = ctx.stack().enter(Arc::clone(&scope));
                let frame = Frame::new(
                    Some(scope),
                    false,
                    ctx.descend(entry.id()),
                    *deadline,
                    attempt,
                );
                flatten(deadline.race(body(frame)).await)
                    .map_err(|failure| self.surface(deadline, failure, true))
            }
            Action::CreateNew => self.execute_owned_async(ctx, deadline, attempt, body).await,
        }
    }

    async fn execute_owned_async<T, F, Fut>(
        &self,
        ctx: &CallContext<P::Scope>,
        deadline: &Deadline,
        attempt: u32,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce(Frame<P::Scope>) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let open = self
            .provider
            .open_scope(self.options.read_only(), self.options.isolation_level());
        let scope = match deadline.race(open).await {
            Ok(Ok(scope)) => scope,
            Ok(Err(err)) => return Err(self.surface(deadline, err.into(), false)),
            Err(timeout) => return Err(self.surface(deadline, timeout, false)),
        };
        self.record(TransactionStats::record_open);

        let mut owned = OwnedScope::task(scope);
        let handle = Arc::clone(owned.handle());
        let entry = ctx.stack().enter(Arc::clone(&handle));
        debug!(scope = %entry.id(), "scope opened");

        let frame = Frame::new(
            Some(Arc::clone(&handle)),
            true,
            ctx.descend(entry.id()),
            *deadline,
            attempt,
        );
        let outcome = flatten(deadline.race(body(frame)).await);

        let result = match outcome {
            Ok(value) => match deadline.race(handle.commit()).await {
                Ok(Ok(())) => {
                    self.record(TransactionStats::record_commit);
                    debug!(scope = %entry.id(), "scope committed");
                    Ok(value)
                }
                Ok(Err(err)) => {
                    warn!(scope = %entry.id(), error = %err, "commit failed, rolling back");
                    self.rollback_async(&*handle).await;
                    Err(self.surface(deadline, err.into(), true))
                }
                Err(timeout) => {
                    warn!(scope = %entry.id(), "commit cancelled by deadline, rolling back");
                    self.rollback_async(&*handle).await;
                    Err(self.surface(deadline, timeout, true))
                }
            },
            Err(failure) => {
                self.rollback_async(&*handle).await;
                Err(self.surface(deadline, failure, true))
            }
        };

        owned.mark_settled();
        owned.close();
        drop(entry);
        result
    }

    // Not raced: cleanup must finish even after the deadline has passed.
    async fn rollback_async(&self, scope: &P::Scope) {
        match scope.rollback().await {
            Ok(()) => {
                self.record(TransactionStats::record_rollback);
                debug!("scope rolled back");
            }
            Err(err) => warn!(error = %err, "rollback failed"),
        }
    }
}

fn flatten<T>(raced: Result<Result<T, Failure>, Failure>) -> Result<T, Failure> {
    raced.and_then(|inner| inner)
}
