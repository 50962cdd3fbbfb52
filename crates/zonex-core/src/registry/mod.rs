//! Plugin-based sink registry
//!
//! Sinks are registered by type name at startup so the driver never needs a
//! hardcoded if-else chain over sink kinds.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonex_core::registry::SinkRegistry;
//! use zonex_core::config::SinkConfig;
//!
//! let registry = SinkRegistry::with_builtins();
//! zonex_sink_mongodb::register(&registry);
//!
//! let sink = registry.create_sink(&config.sink).await?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &SinkRegistry) {
//!     registry.register_sink("mongodb", Arc::new(MongoRecordSinkFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::sink::{FileRecordSinkFactory, MemoryRecordSinkFactory};
use crate::traits::{RecordSink, RecordSinkFactory};

/// Sink registry for plugin-based sink creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: RwLock<HashMap<String, Arc<dyn RecordSinkFactory>>>,
}

impl SinkRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` sinks registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_sink("memory", Arc::new(MemoryRecordSinkFactory));
        registry.register_sink("file", Arc::new(FileRecordSinkFactory));
        registry
    }

    /// Register a sink factory
    ///
    /// # Parameters
    ///
    /// - `name`: Sink type name (e.g., "file", "mongodb")
    /// - `factory`: Factory object for creating sink instances
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_sink(&self, name: impl Into<String>, factory: Arc<dyn RecordSinkFactory>) {
        let name = name.into();
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        sinks.insert(name, factory);
    }

    /// Create a sink from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn RecordSink>)`: Created sink instance
    /// - `Err(Error)`: If the sink type is not registered or creation fails
    pub async fn create_sink(&self, config: &SinkConfig) -> Result<Arc<dyn RecordSink>> {
        config.validate()?;
        let sink_type = config.type_name();

        let factory = {
            let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
            sinks
                .get(sink_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown sink type: {}", sink_type)))?
        };

        // Lock is released before the async create
        factory.create(config).await
    }

    /// List all registered sink types, sorted
    pub fn list_sinks(&self) -> Vec<String> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sinks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a sink type is registered
    pub fn has_sink(&self, name: &str) -> bool {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockSinkFactory;

    #[async_trait]
    impl RecordSinkFactory for MockSinkFactory {
        async fn create(&self, _config: &SinkConfig) -> Result<Arc<dyn RecordSink>> {
            Err(Error::sink_write("Mock sink not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = SinkRegistry::new();

        assert!(!registry.has_sink("mock"));
        registry.register_sink("mock", Arc::new(MockSinkFactory));
        assert!(registry.has_sink("mock"));
        assert_eq!(registry.list_sinks(), vec!["mock".to_string()]);
    }

    #[tokio::test]
    async fn test_builtins_create_sinks() {
        let registry = SinkRegistry::with_builtins();
        assert_eq!(registry.list_sinks(), vec!["file", "memory"]);

        let sink = registry.create_sink(&SinkConfig::Memory).await.unwrap();
        assert_eq!(sink.sink_name(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_sink_type() {
        let registry = SinkRegistry::with_builtins();
        let config = SinkConfig::Mongodb {
            connection_string: "mongodb://localhost/zone".to_string(),
            collection: "domains".to_string(),
        };

        match registry.create_sink(&config).await {
            Err(Error::Config(msg)) => assert!(msg.contains("mongodb")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("mongodb is not a builtin"),
        }
    }

    #[tokio::test]
    async fn test_custom_sink_dispatches_by_factory_name() {
        let registry = SinkRegistry::new();
        registry.register_sink("mock", Arc::new(MockSinkFactory));

        let config = SinkConfig::Custom {
            factory: "mock".to_string(),
            config: serde_json::json!({ "any": true }),
        };
        assert!(matches!(
            registry.create_sink(&config).await,
            Err(Error::SinkWrite(_))
        ));
    }
}
