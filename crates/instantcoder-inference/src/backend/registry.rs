//! Backend registry for runtime backend discovery and instantiation
//!
//! The registry manages available backends and provides factory methods
//! to create backend instances. Backends are registered at compile time
//! via feature flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BackendConfig, BackendError, BackendInfo, ModelBackend};

#[cfg(feature = "backend-gemini")]
use super::GeminiBackend;

#[cfg(feature = "backend-openai")]
use super::OpenAiCompatBackend;

/// Factory trait for creating backend instances
pub trait BackendFactory: Send + Sync {
    /// Create a new backend instance
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError>;

    /// Get information about this backend
    fn info(&self) -> BackendInfo;
}

/// Factory for the Gemini backend
#[cfg(feature = "backend-gemini")]
pub struct GeminiFactory;

#[cfg(feature = "backend-gemini")]
impl BackendFactory for GeminiFactory {
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::Config("Gemini requires an API key".to_string()))?;

        let mut backend = GeminiBackend::new(api_key);
        if let Some(url) = &config.base_url {
            backend = backend.with_base_url(url.as_str());
        }
        Ok(Arc::new(backend))
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "Gemini".to_string(),
            description: "Google Gemini via the Generative Language REST API".to_string(),
            requires_api_key: true,
            default_base_url: super::gemini::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Factory for OpenAI-compatible servers
#[cfg(feature = "backend-openai")]
pub struct OpenAiCompatFactory;

#[cfg(feature = "backend-openai")]
impl BackendFactory for OpenAiCompatFactory {
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(super::openai::DEFAULT_BASE_URL);

        let mut backend = OpenAiCompatBackend::new(base_url);
        if let Some(key) = config.api_key.as_ref().filter(|key| !key.trim().is_empty()) {
            backend = backend.with_api_key(key.as_str());
        }
        Ok(Arc::new(backend))
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "OpenAI-compatible".to_string(),
            description: "Any /v1/chat/completions server (Ollama, llama.cpp, vLLM)".to_string(),
            requires_api_key: false,
            default_base_url: super::openai::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Registry of available model backends
///
/// Backends are registered at compile time based on feature flags.
/// At runtime, the registry can list available backends and create
/// instances on demand.
pub struct BackendRegistry {
    factories: BTreeMap<String, Box<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a new registry with all available backends registered
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };

        #[cfg(feature = "backend-gemini")]
        registry.register("Gemini", Box::new(GeminiFactory));

        #[cfg(feature = "backend-openai")]
        registry.register("OpenAI-compatible", Box::new(OpenAiCompatFactory));

        registry
    }

    /// Register a backend factory
    pub fn register(&mut self, name: &str, factory: Box<dyn BackendFactory>) {
        self.factories.insert(name.to_string(), factory);
    }

    /// List all available backend names
    pub fn available_names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Get information about all registered backends
    pub fn list(&self) -> Vec<BackendInfo> {
        self.factories.values().map(|f| f.info()).collect()
    }

    /// Create a backend instance by name
    pub fn create(
        &self,
        name: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BackendError::Config(format!("Unknown backend: {}", name)))?;

        let backend = factory.create(config)?;
        log::info!("Created {} backend at {}", backend.name(), backend.base_url());
        Ok(backend)
    }

    /// Check if a backend is available
    pub fn is_available(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_is_config_error() {
        let registry = BackendRegistry::new();
        let result = registry.create("Candle", &BackendConfig::default());
        assert!(matches!(result, Err(BackendError::Config(_))));
    }

    #[cfg(feature = "backend-gemini")]
    #[test]
    fn test_gemini_requires_key() {
        let registry = BackendRegistry::new();
        assert!(registry.is_available("Gemini"));
        assert!(registry.create("Gemini", &BackendConfig::default()).is_err());

        let config = BackendConfig {
            api_key: Some("secret".to_string()),
            base_url: Some("http://localhost:9000/".to_string()),
        };
        let backend = registry.create("Gemini", &config).unwrap();
        assert_eq!(backend.name(), "Gemini");
        assert_eq!(backend.base_url(), "http://localhost:9000");
    }

    #[cfg(feature = "backend-openai")]
    #[test]
    fn test_openai_defaults_to_local_server() {
        let registry = BackendRegistry::new();
        let backend = registry
            .create("OpenAI-compatible", &BackendConfig::default())
            .unwrap();
        assert_eq!(backend.base_url(), "http://127.0.0.1:11434");
    }
}
