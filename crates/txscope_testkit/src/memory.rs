//! Blocking in-memory resource provider.
//!
//! Scopes buffer key/value writes; commit publishes them to the provider's
//! shared map, rollback and close discard them. Every provider call is
//! recorded in a [`Journal`], and failures can be scripted per operation.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use txscope_core::{Failure, ProviderError, ProviderResult, ResourceProvider, Scope};

use crate::journal::{Event, Journal};

#[derive(Debug, Default)]
pub(crate) struct ProviderState {
    pub(crate) journal: Journal,
    next_id: AtomicU64,
    fail_opens: AtomicU32,
    fail_commits: AtomicU32,
    fail_rollbacks: AtomicU32,
    data: RwLock<BTreeMap<String, String>>,
}

impl ProviderState {
    /// Consumes one scripted failure from `counter`, if any remain.
    fn take(&self, counter: &AtomicU32, operation: &'static str) -> ProviderResult<()> {
        let fired = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fired {
            self.journal.record(Event::Injected { operation });
            Err(ProviderError::new(format!("injected {operation} failure")))
        } else {
            Ok(())
        }
    }

    pub(crate) fn open(
        self: &Arc<Self>,
        read_only: bool,
        isolation_level: Option<&str>,
    ) -> ProviderResult<MemoryScope> {
        self.take(&self.fail_opens, "open")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let isolation = isolation_level.map(str::to_string);
        self.journal.record(Event::Opened {
            scope: id,
            read_only,
            isolation: isolation.clone(),
        });
        Ok(MemoryScope {
            id,
            read_only,
            isolation,
            state: Arc::clone(self),
            pending: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            commits: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        })
    }
}

/// Blocking provider backed by an in-memory map.
///
/// Clones share state, so a test can keep one handle for assertions after
/// registering another.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    pub(crate) state: Arc<ProviderState>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// The event journal.
    pub fn journal(&self) -> &Journal {
        &self.state.journal
    }

    /// Makes the next `n` opens fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail.
    pub fn fail_next_commits(&self, n: u32) {
        self.state.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` rollbacks fail.
    pub fn fail_next_rollbacks(&self, n: u32) {
        self.state.fail_rollbacks.store(n, Ordering::SeqCst);
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.data.read().get(key).cloned()
    }

    /// Snapshot of all committed data.
    pub fn committed(&self) -> BTreeMap<String, String> {
        self.state.data.read().clone()
    }
}

impl ResourceProvider for MemoryProvider {
    type Scope = MemoryScope;

    fn open_scope(
        &self,
        read_only: bool,
        isolation_level: Option<&str>,
    ) -> ProviderResult<MemoryScope> {
        self.state.open(read_only, isolation_level)
    }
}

/// A scope opened by a memory provider.
#[derive(Debug)]
pub struct MemoryScope {
    id: u64,
    read_only: bool,
    isolation: Option<String>,
    state: Arc<ProviderState>,
    pending: Mutex<BTreeMap<String, String>>,
    closed: AtomicBool,
    commits: AtomicU32,
    rollbacks: AtomicU32,
    closes: AtomicU32,
}

impl MemoryScope {
    /// Scope number, unique per provider.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the scope was opened read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Isolation level applied at open.
    pub fn isolation_level(&self) -> Option<&str> {
        self.isolation.as_deref()
    }

    /// Buffers a write until commit.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), Failure> {
        if self.read_only {
            return Err(Failure::application(
                "read_only",
                format!("scope {} is read-only", self.id),
            ));
        }
        if self.is_closed() {
            return Err(ProviderError::new(format!("scope {} is closed", self.id)).into());
        }
        self.pending.lock().insert(key.into(), value.into());
        Ok(())
    }

    /// Reads through pending writes to committed data.
    pub fn get(&self, key: &str) -> Option<String> {
        self.pending
            .lock()
            .get(key)
            .cloned()
            .or_else(|| self.state.data.read().get(key).cloned())
    }

    /// Number of commit calls.
    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of rollback calls.
    pub fn rollbacks(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Number of close calls.
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn commit_now(&self) -> ProviderResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(ProviderError::new(format!("scope {} is closed", self.id)));
        }
        self.state.take(&self.state.fail_commits, "commit")?;
        let pending = std::mem::take(&mut *self.pending.lock());
        self.state.data.write().extend(pending);
        self.state.journal.record(Event::Committed { scope: self.id });
        Ok(())
    }

    pub(crate) fn rollback_now(&self) -> ProviderResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().clear();
        self.state.take(&self.state.fail_rollbacks, "rollback")?;
        self.state.journal.record(Event::RolledBack { scope: self.id });
        Ok(())
    }

    pub(crate) fn close_now(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
        self.state.journal.record(Event::Closed { scope: self.id });
    }
}

impl Scope for MemoryScope {
    fn commit(&self) -> ProviderResult<()> {
        self.commit_now()
    }

    fn rollback(&self) -> ProviderResult<()> {
        self.rollback_now()
    }

    fn close(&self) {
        self.close_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_publishes_writes() {
        let provider = MemoryProvider::new();
        let scope = provider.open_scope(false, Some("SERIALIZABLE")).unwrap();
        scope.put("k", "v").unwrap();
        assert_eq!(provider.get("k"), None);
        assert_eq!(scope.get("k").as_deref(), Some("v"));
        scope.commit().unwrap();
        scope.close();
        assert_eq!(provider.get("k").as_deref(), Some("v"));
        assert_eq!(scope.isolation_level(), Some("SERIALIZABLE"));
    }

    #[test]
    fn rollback_discards_writes() {
        let provider = MemoryProvider::new();
        let scope = provider.open_scope(false, None).unwrap();
        scope.put("k", "v").unwrap();
        scope.rollback().unwrap();
        scope.close();
        assert!(provider.committed().is_empty());
        assert!(provider.journal().verify_lifecycles().is_ok());
    }

    #[test]
    fn read_only_rejects_writes() {
        let provider = MemoryProvider::new();
        let scope = provider.open_scope(true, None).unwrap();
        assert!(scope.put("k", "v").is_err());
    }

    #[test]
    fn injected_failures_are_consumed() {
        let provider = MemoryProvider::new();
        provider.fail_next_opens(2);
        assert!(provider.open_scope(false, None).is_err());
        assert!(provider.open_scope(false, None).is_err());
        assert!(provider.open_scope(false, None).is_ok());
        assert_eq!(provider.journal().injected(), 2);
        assert_eq!(provider.journal().opens(), 1);
    }

    #[test]
    fn scope_ids_are_unique() {
        let provider = MemoryProvider::new();
        let a = provider.open_scope(false, None).unwrap();
        let b = provider.open_scope(false, None).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
