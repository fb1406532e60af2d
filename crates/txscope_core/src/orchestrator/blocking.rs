use std::sync::Arc;

use tracing::{debug, warn};

use super::ScopeOrchestrator;
use crate::context::{CallContext, Frame};
use crate::error::{Failure, TxResult};
use crate::policy::Action;
use crate::provider::{ResourceProvider, Scope};
use crate::scope::OwnedScope;
use crate::stats::TransactionStats;
use crate::timeout::Deadline;

impl<P: ResourceProvider> ScopeOrchestrator<'_, P> {
    /// Runs one attempt of a blocking body.
    ///
    /// The body must observe `deadline` through the frame
    /// ([`Frame::checkpoint`], [`Frame::sleep`]); a blocking call cannot be
    /// interrupted from outside.
    pub fn execute<T, F>(
        &self,
        ctx: &CallContext<P::Scope>,
        deadline: &Deadline,
        attempt: u32,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce(&Frame<P::Scope>) -> Result<T, Failure>,
    {
        match self.plan(ctx, attempt) {
            Action::Reject(reason) => Err(self.reject(reason)),
            Action::ProceedWithoutScope => {
                self.record(TransactionStats::record_unscoped);
                let frame = Frame::new(None, false, ctx.clone(), *deadline, attempt);
                body(&frame).map_err(|failure| self.surface(deadline, failure, false))
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
                body(&frame).map_err(|failure| self.surface(deadline, failure, true))
            }
            Action::CreateNew => self.execute_owned(ctx, deadline, attempt, body),
        }
    }

    fn execute_owned<T, F>(
        &self,
        ctx: &CallContext<P::Scope>,
        deadline: &Deadline,
        attempt: u32,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce(&Frame<P::Scope>) -> Result<T, Failure>,
    {
        deadline
            .check()
            .map_err(|failure| self.surface(deadline, failure, false))?;

        let scope = self
            .provider
            .open_scope(self.options.read_only(), self.options.isolation_level())
            .map_err(|err| self.surface(deadline, err.into(), false))?;
        self.record(TransactionStats::record_open);

        let mut owned = OwnedScope::blocking(scope);
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
        let outcome = body(&frame).and_then(|value| deadline.check().map(|()| value));
        drop(frame);

        let result = match outcome {
            Ok(value) => match handle.commit() {
                Ok(()) => {
                    self.record(TransactionStats::record_commit);
                    debug!(scope = %entry.id(), "scope committed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(scope = %entry.id(), error = %err, "commit failed, rolling back");
                    self.rollback(&*handle);
                    Err(self.surface(deadline, err.into(), true))
                }
            },
            Err(failure) => {
                self.rollback(&*handle);
                Err(self.surface(deadline, failure, true))
            }
        };

        owned.mark_settled();
        owned.close();
        drop(entry);
        result
    }

    fn rollback(&self, scope: &P::Scope) {
        match scope.rollback() {
            Ok(()) => {
                self.record(TransactionStats::record_rollback);
                debug!("scope rolled back");
            }
            Err(err) => warn!(error = %err, "rollback failed"),
        }
    }
}
