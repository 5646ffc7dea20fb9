//! Routes a session's provider family to the adapter that serves it.
//!
//! ```rust
//! use tprovider::{ProviderId, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new();
//! assert!(registry.is_empty());
//! assert!(registry.route(ProviderId::Gemini).is_none());
//! assert_eq!(registry.families(), Vec::<ProviderId>::new());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::{ModelProvider, ProviderId};

/// At most one adapter per provider family; a later registration for the
/// same family replaces the earlier one.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, provider: P) -> Option<Arc<dyn ModelProvider>>
    where
        P: ModelProvider + 'static,
    {
        self.register_shared(Arc::new(provider))
    }

    /// Returns the adapter this one displaced, if any.
    pub fn register_shared(
        &mut self,
        provider: Arc<dyn ModelProvider>,
    ) -> Option<Arc<dyn ModelProvider>> {
        self.adapters.insert(provider.id(), provider)
    }

    pub fn route(&self, family: ProviderId) -> Option<Arc<dyn ModelProvider>> {
        self.adapters.get(&family).cloned()
    }

    /// Served families in [`ProviderId::ALL`] order.
    pub fn families(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|family| self.adapters.contains_key(family))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
