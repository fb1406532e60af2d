//! Named resource directory.
//!
//! Call sites address a provider by name ("the database") rather than by
//! reference. The registry is an explicitly constructed value shared through
//! `Arc`; there is no process-wide instance.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::{TxError, TxResult};

/// Concurrency-safe mapping of resource name to provider.
///
/// Reads share a lock; register, unregister and clear take it exclusively.
pub struct ScopeRegistry<P> {
    providers: RwLock<HashMap<String, Arc<P>>>,
}

impl<P> ScopeRegistry<P> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `provider` under `name`.
    ///
    /// Fails if the name is taken and `replace` is false. Returns the
    /// provider that was replaced, if any.
    pub fn register(
        &self,
        name: impl Into<String>,
        provider: Arc<P>,
        replace: bool,
    ) -> TxResult<Option<Arc<P>>> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TxError::configuration("resource name must not be empty"));
        }

        let mut providers = self.providers.write();
        if !replace && providers.contains_key(&name) {
            return Err(TxError::ResourceAlreadyRegistered { name });
        }
        let previous = providers.insert(name.clone(), provider);
        drop(providers);

        info!(resource = %name, replaced = previous.is_some(), "resource registered");
        Ok(previous)
    }

    /// Looks up the provider registered under `name`.
    pub fn get(&self, name: &str) -> TxResult<Arc<P>> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TxError::not_registered(name))
    }

    /// Removes `name`, returning its provider if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<P>> {
        let removed = self.providers.write().remove(name);
        if removed.is_some() {
            info!(resource = %name, "resource unregistered");
        }
        removed
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let count = {
            let mut providers = self.providers.write();
            let count = providers.len();
            providers.clear();
            count
        };
        info!(count, "registry cleared");
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl<P> Default for ScopeRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for ScopeRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::thread;

    #[test]
    fn register_and_get() {
        let registry = ScopeRegistry::new();
        registry.register("main", Arc::new(1u32), false).unwrap();
        assert_eq!(*registry.get("main").unwrap(), 1);
        assert!(registry.contains("main"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_requires_replace() {
        let registry = ScopeRegistry::new();
        registry.register("main", Arc::new(1u32), false).unwrap();

        let err = registry.register("main", Arc::new(2), false).unwrap_err();
        assert!(matches!(err, TxError::ResourceAlreadyRegistered { .. }));
        assert_eq!(*registry.get("main").unwrap(), 1);

        let previous = registry.register("main", Arc::new(2), true).unwrap();
        assert_eq!(previous.as_deref(), Some(&1));
        assert_eq!(*registry.get("main").unwrap(), 2);
    }

    #[test]
    fn missing_name_is_not_found() {
        let registry: ScopeRegistry<u32> = ScopeRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ScopeRegistry::new();
        registry.register("main", Arc::new(1u32), false).unwrap();
        assert!(registry.unregister("main").is_some());
        assert!(registry.unregister("main").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn empty_name_is_rejected() {
        let registry = ScopeRegistry::new();
        assert!(registry.register("", Arc::new(1u32), false).is_err());
    }

    #[test]
    fn clear_and_names() {
        let registry = ScopeRegistry::new();
        registry.register("b", Arc::new(1u32), false).unwrap();
        registry.register("a", Arc::new(2u32), false).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let registry = Arc::new(ScopeRegistry::new());
        registry.register("shared", Arc::new(0u32), false).unwrap();

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..100u32 {
                        let name = format!("r{t}-{i}");
                        registry.register(name.clone(), Arc::new(i), false).unwrap();
                        assert!(registry.get("shared").is_ok());
                        assert!(registry.unregister(&name).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.names(), vec!["shared".to_string()]);
    }
}
