//! Backend factory pattern for dynamic inference backend registration.
//!
//! New backends register a factory that creates instances from JSON
//! configuration, so the config layer selects them by name and the CLI
//! lists them with their descriptions.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = BackendRegistry::with_defaults();
//! let backend = registry.create("ollama", &serde_json::json!({"base_url": "http://localhost:11434"}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{InferenceBackend, ProviderError};

/// Factory for creating inference backends from configuration.
pub trait BackendFactory: Send + Sync {
    /// Unique identifier for this backend type (e.g. "ollama").
    fn backend_type(&self) -> &'static str;

    /// Create a backend instance from JSON configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn InferenceBackend>, ProviderError>;

    /// Validate configuration without creating a backend.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Default configuration for this backend.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    /// Human-readable description of this backend.
    fn description(&self) -> &'static str {
        "Inference backend"
    }
}

/// Registry of available backend factories.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory, replacing one with the same type.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories
            .insert(factory.backend_type().to_string(), factory);
    }

    /// Create a backend from type name and configuration.
    pub fn create(
        &self,
        backend_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn InferenceBackend>, ProviderError> {
        let factory = self.factories.get(backend_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown backend type: '{}'. Available: {:?}",
                backend_type,
                self.available_types()
            ))
        })?;
        factory.validate_config(config)?;
        factory.create(config)
    }

    /// List available backend types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Description of a registered backend type.
    pub fn description(&self, backend_type: &str) -> Option<&'static str> {
        self.factories.get(backend_type).map(|f| f.description())
    }

    /// Default configuration of a registered backend type.
    pub fn default_config(&self, backend_type: &str) -> Option<JsonValue> {
        self.factories.get(backend_type).map(|f| f.default_config())
    }

    /// Create a registry with all built-in backends registered.
    #[cfg(feature = "http")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OllamaBackendFactory));
        registry.register(Arc::new(super::InferenceApiBackendFactory));
        registry
    }

    /// Create a registry with all built-in backends registered.
    #[cfg(not(feature = "http"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.available_types())
            .finish()
    }
}
