//! String-keyed adapter registry
//!
//! Connections name their provider by type string; the registry resolves it
//! to an adapter instance. New providers register here without touching the
//! orchestrator.

use super::{EmailitAdapter, ProviderAdapter, ZohoAdapter};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in providers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailitAdapter::new()));
        registry.register(Arc::new(ZohoAdapter::new()));
        registry
    }

    /// Register an adapter under its declared provider type. A later
    /// registration for the same type replaces the earlier one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider_type(), adapter);
    }

    pub fn get(&self, provider_type: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_type).cloned()
    }

    pub fn provider_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.adapters.keys().copied().collect();
        types.sort_unstable();
        types
    }
}
