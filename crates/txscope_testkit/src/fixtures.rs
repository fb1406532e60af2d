//! Test fixtures.
//!
//! Ready-made registries and wrappers over the memory providers, plus option
//! shortcuts.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use txscope_core::{
    AsyncTransactional, Failure, Propagation, ScopeRegistry, TransactionMode,
    TransactionOptions, Transactional, DEFAULT_RESOURCE,
};

use crate::async_memory::AsyncMemoryProvider;
use crate::memory::MemoryProvider;

/// Blocking provider registered under the default resource name.
pub struct MemoryEnv {
    /// Handle to the registered provider.
    pub provider: MemoryProvider,
    /// Registry containing the provider.
    pub registry: Arc<ScopeRegistry<MemoryProvider>>,
}

impl MemoryEnv {
    /// Creates a registry with a fresh provider.
    pub fn new() -> Self {
        Self::with_provider(MemoryProvider::new())
    }

    /// Registers `provider` in a fresh registry.
    pub fn with_provider(provider: MemoryProvider) -> Self {
        let registry = Arc::new(ScopeRegistry::new());
        registry
            .register(DEFAULT_RESOURCE, Arc::new(provider.clone()), false)
            .expect("Failed to register provider");
        Self { provider, registry }
    }

    /// Declares a wrapper with `options`.
    pub fn wrap(&self, options: TransactionOptions) -> Transactional<MemoryProvider> {
        Transactional::new(Arc::clone(&self.registry), options).expect("Failed to declare wrapper")
    }

    /// Declares a wrapper with default options and `propagation`.
    pub fn wrap_with(&self, propagation: Propagation) -> Transactional<MemoryProvider> {
        self.wrap(options(propagation))
    }
}

impl Default for MemoryEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Async provider registered under the default resource name.
pub struct AsyncMemoryEnv {
    /// Handle to the registered provider.
    pub provider: AsyncMemoryProvider,
    /// Registry containing the provider.
    pub registry: Arc<ScopeRegistry<AsyncMemoryProvider>>,
}

impl AsyncMemoryEnv {
    /// Creates a registry with a fresh provider.
    pub fn new() -> Self {
        Self::with_provider(AsyncMemoryProvider::new())
    }

    /// Registers `provider` in a fresh registry.
    pub fn with_provider(provider: AsyncMemoryProvider) -> Self {
        let registry = Arc::new(ScopeRegistry::new());
        registry
            .register(DEFAULT_RESOURCE, Arc::new(provider.clone()), false)
            .expect("Failed to register provider");
        Self { provider, registry }
    }

    /// Declares an async wrapper with `options`; the mode is forced to async.
    pub fn wrap(&self, options: TransactionOptions) -> AsyncTransactional<AsyncMemoryProvider> {
        let options = options
            .to_builder()
            .mode(TransactionMode::Async)
            .build()
            .expect("Invalid options");
        AsyncTransactional::new(Arc::clone(&self.registry), options)
            .expect("Failed to declare wrapper")
    }

    /// Declares an async wrapper with default options and `propagation`.
    pub fn wrap_with(&self, propagation: Propagation) -> AsyncTransactional<AsyncMemoryProvider> {
        self.wrap(options(propagation))
    }
}

impl Default for AsyncMemoryEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Default options with `propagation`.
pub fn options(propagation: Propagation) -> TransactionOptions {
    TransactionOptions::builder()
        .propagation(propagation)
        .build()
        .expect("Invalid options")
}

/// Options with retries and a short backoff.
pub fn retrying(propagation: Propagation, retry_count: u32, backoff: Duration) -> TransactionOptions {
    TransactionOptions::builder()
        .propagation(propagation)
        .retry_count(retry_count)
        .retry_backoff(backoff)
        .build()
        .expect("Invalid options")
}

/// Options with a per-attempt deadline.
pub fn with_timeout(propagation: Propagation, timeout: Duration) -> TransactionOptions {
    TransactionOptions::builder()
        .propagation(propagation)
        .timeout(timeout)
        .build()
        .expect("Invalid options")
}

/// An application failure of class `"test"`.
pub fn app_failure(message: &str) -> Failure {
    Failure::application("test", message.to_string())
}

/// Writes `contents` to a temporary file that lives as long as the handle.
pub fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

/// Writes `value` as JSON to a temporary file.
pub fn temp_json(value: &serde_json::Value) -> NamedTempFile {
    temp_file(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_registers_default_resource() {
        let env = MemoryEnv::new();
        assert!(env.registry.contains(DEFAULT_RESOURCE));
        let wrapper = env.wrap_with(Propagation::Supports);
        assert_eq!(wrapper.options().propagation(), Propagation::Supports);
    }

    #[test]
    fn async_env_forces_async_mode() {
        let env = AsyncMemoryEnv::new();
        let wrapper = env.wrap_with(Propagation::Required);
        assert_eq!(wrapper.options().mode(), TransactionMode::Async);
    }

    #[test]
    fn temp_json_round_trip() {
        let file = temp_json(&serde_json::json!({"propagation": "NEVER"}));
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("NEVER"));
    }
}
