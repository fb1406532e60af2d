//! Per-call-chain stack of active scopes.

use crate::types::ScopeId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Ordered collection of the scopes active in one call chain.
///
/// Entries are keyed by a [`ScopeId`] handed out by [`push`](Self::push).
/// IDs increase monotonically and are never reused, so iteration order of the
/// underlying map is insertion order and [`current`](Self::current) is the
/// entry with the highest ID.
///
/// The stack is shared by every frame of a chain, including concurrently
/// running sub-tasks, so the highest ID may belong to a sibling. Frames look
/// up their own enclosing scope through [`CallContext`](crate::CallContext),
/// which follows the IDs pushed by its ancestors.
///
/// ## Pop discipline
///
/// [`pop`](Self::pop) removes by ID, never by position. A frame only ever pops
/// the ID it pushed; an out-of-order pop from a sibling frame cannot remove
/// someone else's entry.
///
/// ## Concurrency
///
/// All mutations take the exclusive lock; [`current`](Self::current) takes the
/// shared lock and returns a snapshot. Push, pop and current are therefore
/// linearizable with respect to each other.
pub struct ScopeStack<S> {
    inner: RwLock<StackInner<S>>,
}

struct StackInner<S> {
    /// Next ID to hand out.
    next_id: u64,
    /// Active entries, ordered by ID.
    entries: BTreeMap<ScopeId, Arc<S>>,
}

impl<S> ScopeStack<S> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StackInner {
                next_id: 1,
                entries: BTreeMap::new(),
            }),
        }
    }

    /// Pushes a scope and returns its ID.
    pub fn push(&self, scope: Arc<S>) -> ScopeId {
        let mut inner = self.inner.write();
        let id = ScopeId::new(inner.next_id);
        inner.next_id += 1;
        inner.entries.insert(id, scope);
        id
    }

    /// Removes the entry with `id`.
    ///
    /// Returns `None` if it was already removed.
    pub fn pop(&self, id: ScopeId) -> Option<Arc<S>> {
        self.inner.write().entries.remove(&id)
    }

    /// Returns the most recently pushed scope still on the stack.
    #[must_use]
    pub fn current(&self) -> Option<Arc<S>> {
        self.inner
            .read()
            .entries
            .last_key_value()
            .map(|(_, scope)| Arc::clone(scope))
    }

    /// Returns the scope stored under `id`, if it is still on the stack.
    #[must_use]
    pub fn get(&self, id: ScopeId) -> Option<Arc<S>> {
        self.inner.read().entries.get(&id).map(Arc::clone)
    }

    /// Returns the ID of the most recently pushed entry.
    #[must_use]
    pub fn current_id(&self) -> Option<ScopeId> {
        self.inner.read().entries.last_key_value().map(|(id, _)| *id)
    }

    /// Returns true if `id` is still on the stack.
    #[must_use]
    pub fn contains(&self, id: ScopeId) -> bool {
        self.inner.read().entries.contains_key(&id)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if no entries are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Removes every entry.
    ///
    /// IDs keep increasing after a clear; they are never reused.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }

    /// Pushes `scope` and returns a guard that pops it on drop.
    pub fn enter(&self, scope: Arc<S>) -> StackEntry<'_, S> {
        let id = self.push(scope);
        StackEntry { stack: self, id }
    }
}

impl<S> Default for ScopeStack<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for ScopeStack<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ScopeStack")
            .field("len", &inner.entries.len())
            .field("next_id", &inner.next_id)
            .finish_non_exhaustive()
    }
}

/// RAII handle for one pushed entry.
///
/// Pops exactly its own ID when dropped, on every exit path including
/// unwinding and future cancellation.
#[must_use = "dropping the entry pops the scope immediately"]
pub struct StackEntry<'a, S> {
    stack: &'a ScopeStack<S>,
    id: ScopeId,
}

impl<S> StackEntry<'_, S> {
    /// The ID this entry was pushed under.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }
}

impl<S> Drop for StackEntry<'_, S> {
    fn drop(&mut self) {
        self.stack.pop(self.id);
    }
}

impl<S> fmt::Debug for StackEntry<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackEntry").field("id", &self.id).finish()
    }
}
