//! Name-to-factory adapter resolution.

use std::sync::{Arc, RwLock};

use ferry_types::Direction;
use tracing::debug;

use crate::traits::{AdapterFactory, TransferAdapter};

/// The adapter every remote is assumed to support; also the fallback when a
/// remote chooses a name this client has no factory for, and the only
/// adapter legacy negotiation can drive.
pub const BASIC_ADAPTER: &str = "basic";

/// Registered adapter factories, in client-preference order.
///
/// Registration order is what the queue advertises to the remote, so hosts
/// should register their most preferred adapter first.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: RwLock<Vec<(String, Arc<dyn AdapterFactory>)>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry with
    /// the same name (its preference position is kept).
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        let name = name.into();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(slot) = entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = factory;
        } else {
            entries.push((name, factory));
        }
    }

    /// Registered names in preference order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Build the adapter registered under `name`, or fall back to
    /// [`BASIC_ADAPTER`]. `None` only when neither is registered.
    pub fn new_adapter_or_default(
        &self,
        name: &str,
        direction: Direction,
    ) -> Option<Arc<dyn TransferAdapter>> {
        let entries = self.entries.read().expect("registry lock poisoned");

        let factory = entries
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| {
                debug!(requested = name, "unknown adapter, falling back to basic");
                entries.iter().find(|(n, _)| n == BASIC_ADAPTER)
            })
            .map(|(_, f)| Arc::clone(f))?;

        Some(factory.new_adapter(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimAdapter;

    fn sim_factory(name: &'static str) -> Arc<dyn AdapterFactory> {
        Arc::new(move |_direction: Direction| {
            Arc::new(SimAdapter::new(name)) as Arc<dyn TransferAdapter>
        })
    }

    #[test]
    fn test_names_preserve_preference_order() {
        let registry = AdapterRegistry::new();
        registry.register("fancy", sim_factory("fancy"));
        registry.register(BASIC_ADAPTER, sim_factory(BASIC_ADAPTER));

        assert_eq!(registry.names(), vec!["fancy", "basic"]);
    }

    #[test]
    fn test_reregister_keeps_position() {
        let registry = AdapterRegistry::new();
        registry.register("fancy", sim_factory("fancy"));
        registry.register(BASIC_ADAPTER, sim_factory(BASIC_ADAPTER));
        registry.register("fancy", sim_factory("fancy"));

        assert_eq!(registry.names(), vec!["fancy", "basic"]);
    }

    #[test]
    fn test_resolves_registered_name() {
        let registry = AdapterRegistry::new();
        registry.register(BASIC_ADAPTER, sim_factory(BASIC_ADAPTER));
        registry.register("fancy", sim_factory("fancy"));

        let adapter = registry
            .new_adapter_or_default("fancy", Direction::Download)
            .unwrap();
        assert_eq!(adapter.name(), "fancy");
    }

    #[test]
    fn test_unknown_name_falls_back_to_basic() {
        let registry = AdapterRegistry::new();
        registry.register(BASIC_ADAPTER, sim_factory(BASIC_ADAPTER));

        let adapter = registry
            .new_adapter_or_default("tus", Direction::Upload)
            .unwrap();
        assert_eq!(adapter.name(), BASIC_ADAPTER);
    }

    #[test]
    fn test_empty_registry_yields_none() {
        let registry = AdapterRegistry::new();
        assert!(
            registry
                .new_adapter_or_default(BASIC_ADAPTER, Direction::Download)
                .is_none()
        );
    }
}
