//! Application configuration storage
//!
//! Handles persistent storage of backend, model catalog and server settings.
//! The file lives at `<data dir>/config.json`; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use instantcoder_inference::{default_model_options, BackendConfig, ModelOption};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Configuration file name inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// Environment variables read at startup
pub mod env {
    /// API key for the model service
    pub const API_KEY: &str = "GOOGLE_AI_API_KEY";
    /// Listen address override (e.g. `0.0.0.0:3000`)
    pub const LISTEN: &str = "INSTANTCODER_LISTEN";
    /// Data directory override
    pub const DATA_DIR: &str = "INSTANTCODER_DATA_DIR";
}

/// Default values
pub mod defaults {
    pub const LISTEN: &str = "127.0.0.1:3000";
    pub const BACKEND: &str = "Gemini";
    /// Idle sessions are dropped after 30 minutes
    pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
}

/// Model service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Registry name of the backend ("Gemini", "OpenAI-compatible")
    #[serde(default = "default_backend")]
    pub name: String,
    /// Override of the backend's default base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key; `GOOGLE_AI_API_KEY` takes precedence when set
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_backend() -> String {
    defaults::BACKEND.to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            name: default_backend(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Project download settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory to archive; the working directory when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Exclusions on top of the built-in ones
    #[serde(default)]
    pub extra_exclusions: Vec<String>,
}

/// Full application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Socket address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub backend: BackendSettings,
    /// Models offered to clients; the first enabled one is the default
    #[serde(default = "default_model_options")]
    pub models: Vec<ModelOption>,
    /// Replaces the built-in system instructions
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,
}

fn default_listen() -> String {
    defaults::LISTEN.to_string()
}

fn default_idle_timeout() -> u64 {
    defaults::SESSION_IDLE_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backend: BackendSettings::default(),
            models: default_model_options(),
            system_prompt: None,
            export: ExportConfig::default(),
            session_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub async fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = data_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            log::info!("No configuration at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).await?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(data_dir).await?;

        let config_path = data_dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(&config_path, contents).await?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(env::API_KEY).filter(|v| !v.trim().is_empty()) {
            self.backend.api_key = Some(key);
        }
        if let Some(listen) = lookup(env::LISTEN).filter(|v| !v.trim().is_empty()) {
            self.listen = listen;
        }
    }

    /// Model used for creates that name none
    pub fn default_model(&self) -> Option<&str> {
        self.models
            .iter()
            .find(|option| !option.disabled)
            .map(|option| option.value.as_str())
    }

    /// Whether `model` is in the catalog and selectable
    pub fn is_model_enabled(&self, model: &str) -> bool {
        self.models
            .iter()
            .any(|option| option.value == model && !option.disabled)
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            api_key: self.backend.api_key.clone(),
            base_url: self.backend.base_url.clone(),
        }
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Directory archived by the project download
    pub fn export_root(&self) -> std::io::Result<PathBuf> {
        match &self.export.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir(),
        }
    }
}

/// Resolve the data directory holding `config.json`
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(env::DATA_DIR) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("instantcoder"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listen, defaults::LISTEN);
        assert_eq!(config.backend.name, "Gemini");
        assert_eq!(config.default_model(), Some("gemini-2.0-flash-exp"));
        assert!(!config.is_model_enabled("deepseek-r1"));
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "backend": { "name": "OpenAI-compatible" } }"#).unwrap();
        assert_eq!(config.backend.name, "OpenAI-compatible");
        assert_eq!(config.listen, defaults::LISTEN);
        assert_eq!(config.models.len(), 3);
    }

    #[test]
    fn test_default_model_skips_disabled() {
        let mut config = AppConfig::default();
        config.models = vec![
            ModelOption::new("Deepseek R1 (Coming Soon)", "deepseek-r1").disabled(),
            ModelOption::new("qwen2.5-coder", "qwen2.5-coder:7b"),
        ];
        assert_eq!(config.default_model(), Some("qwen2.5-coder:7b"));

        config.models.truncate(1);
        assert_eq!(config.default_model(), None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::API_KEY, "secret-key"),
            (env::LISTEN, "0.0.0.0:8080"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.backend.api_key = Some("from-file".to_string());
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.backend.api_key.as_deref(), Some("secret-key"));
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.backend_config().api_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let mut config = AppConfig::default();
        config.backend.api_key = Some("from-file".to_string());
        config.apply_overrides(|name| (name == env::API_KEY).then(|| "  ".to_string()));
        assert_eq!(config.backend.api_key.as_deref(), Some("from-file"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let missing = AppConfig::load(&data_dir).await.unwrap();
        assert_eq!(missing.listen, defaults::LISTEN);

        let mut config = AppConfig::default();
        config.system_prompt = Some("Use Svelte".to_string());
        config.export.extra_exclusions = vec!["dist".to_string()];
        config.save(&data_dir).await.unwrap();

        let loaded = AppConfig::load(&data_dir).await.unwrap();
        assert_eq!(loaded.system_prompt.as_deref(), Some("Use Svelte"));
        assert_eq!(loaded.export.extra_exclusions, vec!["dist".to_string()]);
        assert_eq!(loaded.models, config.models);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(dir.path()).await,
            Err(ConfigError::Parse(_))
        ));
    }
}
