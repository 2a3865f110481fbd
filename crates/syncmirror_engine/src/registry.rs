//! Name-keyed registry of entity types.
//!
//! The registry is the composition root a host application wires its
//! entity types into: construct each [`EntityType`], register it, and
//! look it up by name anywhere else. Shared request headers (auth tokens,
//! tenant ids) live here so transports can read one place.

use crate::entity_type::EntityType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Registry of entity types and shared request headers.
#[derive(Default)]
pub struct Registry {
    types: RwLock<HashMap<String, Arc<EntityType>>>,
    headers: RwLock<HashMap<String, String>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type under its name.
    ///
    /// Registering a name twice replaces the earlier type; the usual
    /// cause is a wiring mistake, so the replacement is logged.
    pub fn register(&self, entity_type: Arc<EntityType>) -> Arc<EntityType> {
        let name = entity_type.name().to_owned();
        let replaced = self
            .types
            .write()
            .insert(name.clone(), Arc::clone(&entity_type));
        if replaced.is_some() {
            warn!(entity = %name, "entity type re-registered, earlier registration replaced");
        }
        entity_type
    }

    /// Returns the entity type registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        self.types.read().get(name).cloned()
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Sets a header shared by every request the host sends.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.write().insert(name.into(), value.into());
    }

    /// Returns one shared header.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.read().get(name).cloned()
    }

    /// Removes one shared header.
    pub fn remove_header(&self, name: &str) -> bool {
        self.headers.write().remove(name).is_some()
    }

    /// Snapshot of all shared headers.
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::transport::{CallTransport, MockCallTransport, MockRealtimeTransport, RealtimeTransport};
    use syncmirror_protocol::FieldSchema;

    fn entity(name: &str) -> Arc<EntityType> {
        EntityType::new(
            name,
            FieldSchema::new(),
            EngineConfig::new(),
            Arc::new(MockCallTransport::new()) as Arc<dyn CallTransport>,
            Arc::new(MockRealtimeTransport::new()) as Arc<dyn RealtimeTransport>,
            None,
        )
    }

    #[test]
    fn register_and_look_up() {
        let registry = Registry::new();
        registry.register(entity("task"));
        registry.register(entity("note"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("task").unwrap().name(), "task");
        assert!(registry.get("ghost").is_none());
        assert_eq!(registry.names(), vec!["note".to_string(), "task".to_string()]);
    }

    #[test]
    fn re_registration_replaces() {
        let registry = Registry::new();
        let first = registry.register(entity("task"));
        let second = registry.register(entity("task"));

        assert_eq!(registry.len(), 1);
        let current = registry.get("task").unwrap();
        assert!(!Arc::ptr_eq(&current, &first));
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn shared_headers() {
        let registry = Registry::new();
        registry.set_header("authorization", "Bearer abc");
        registry.set_header("tenant", "t-1");

        assert_eq!(registry.header("authorization").as_deref(), Some("Bearer abc"));
        assert_eq!(registry.headers().len(), 2);
        assert!(registry.remove_header("tenant"));
        assert!(!registry.remove_header("tenant"));
    }
}
