//! Call-chain context and the frame handed to user bodies.
//!
//! A [`CallContext`] is created once per top-level call chain and threaded
//! through every nested wrapped call. All contexts of a chain share one
//! [`ScopeStack`] for push/pop bookkeeping, while independent chains never
//! share anything.
//!
//! Each frame hands its body a context derived from its caller's, extended
//! with the stack entry the frame pushed. The current scope of a context is
//! found by walking that lineage, so a nested call joins the scope of its
//! nearest still-active enclosing frame and never a scope pushed by a sibling
//! sub-task running on the same chain.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Failure;
use crate::scope::ScopeStack;
use crate::timeout::Deadline;
use crate::types::ScopeId;

/// Stack entry pushed by one frame, linked to its enclosing frame's entry.
struct Lineage {
    id: ScopeId,
    parent: Option<Arc<Lineage>>,
}

/// Execution context of one logical call chain.
pub struct CallContext<S> {
    stack: Arc<ScopeStack<S>>,
    lineage: Option<Arc<Lineage>>,
}

impl<S> CallContext<S> {
    /// Starts a new call chain with an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Arc::new(ScopeStack::new()),
            lineage: None,
        }
    }

    /// The chain's scope stack.
    #[must_use]
    pub fn stack(&self) -> &ScopeStack<S> {
        &self.stack
    }

    /// The scope of the nearest enclosing frame that is still active.
    #[must_use]
    pub fn current(&self) -> Option<Arc<S>> {
        let mut link = self.lineage.as_deref();
        while let Some(entry) = link {
            if let Some(scope) = self.stack.get(entry.id) {
                return Some(scope);
            }
            link = entry.parent.as_deref();
        }
        None
    }

    /// Stack entry pushed by the innermost enclosing frame.
    #[must_use]
    pub fn entry_id(&self) -> Option<ScopeId> {
        self.lineage.as_ref().map(|entry| entry.id)
    }

    /// Number of active stack entries across the whole chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if both contexts belong to the same call chain.
    #[must_use]
    pub fn same_chain(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stack, &other.stack)
    }

    /// Context for a frame that pushed the entry `id`.
    pub(crate) fn descend(&self, id: ScopeId) -> Self {
        Self {
            stack: Arc::clone(&self.stack),
            lineage: Some(Arc::new(Lineage {
                id,
                parent: self.lineage.clone(),
            })),
        }
    }
}

impl<S> Clone for CallContext<S> {
    fn clone(&self) -> Self {
        Self {
            stack: Arc::clone(&self.stack),
            lineage: self.lineage.clone(),
        }
    }
}

impl<S> Default for CallContext<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for CallContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("depth", &self.depth())
            .field("entry", &self.entry_id())
            .finish()
    }
}

/// What a wrapped body sees while it runs.
///
/// Nested wrapped calls must be made with [`context`](Self::context) so they
/// join this chain.
pub struct Frame<S> {
    scope: Option<Arc<S>>,
    owns_scope: bool,
    context: CallContext<S>,
    deadline: Deadline,
    attempt: u32,
}

impl<S> Frame<S> {
    pub(crate) fn new(
        scope: Option<Arc<S>>,
        owns_scope: bool,
        context: CallContext<S>,
        deadline: Deadline,
        attempt: u32,
    ) -> Self {
        Self {
            scope,
            owns_scope,
            context,
            deadline,
            attempt,
        }
    }

    /// The scope this body runs in, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&S> {
        self.scope.as_deref()
    }

    /// Shared handle to the scope, if any.
    #[must_use]
    pub fn scope_handle(&self) -> Option<&Arc<S>> {
        self.scope.as_ref()
    }

    /// Returns true if the body runs inside a scope.
    #[must_use]
    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// Returns true if this frame opened the scope and will settle it.
    #[must_use]
    pub fn owns_scope(&self) -> bool {
        self.owns_scope
    }

    /// Context for nested wrapped calls.
    #[must_use]
    pub fn context(&self) -> &CallContext<S> {
        &self.context
    }

    /// Deadline of the enclosing wrapped call.
    #[must_use]
    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Fails with a timeout once the deadline has passed.
    pub fn checkpoint(&self) -> Result<(), Failure> {
        self.deadline.check()
    }

    /// Sleeps, waking early with a timeout failure if the deadline passes.
    pub fn sleep(&self, duration: Duration) -> Result<(), Failure> {
        self.deadline.sleep(duration)
    }

    /// Async sleep bounded by the deadline.
    pub async fn sleep_async(&self, duration: Duration) -> Result<(), Failure> {
        self.deadline.sleep_async(duration).await
    }
}

impl<S> Clone for Frame<S> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            owns_scope: self.owns_scope,
            context: self.context.clone(),
            deadline: self.deadline,
            attempt: self.attempt,
        }
    }
}

impl<S> fmt::Debug for Frame<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("has_scope", &self.has_scope())
            .field("owns_scope", &self.owns_scope)
            .field("attempt", &self.attempt)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
