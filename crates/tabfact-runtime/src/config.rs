//! Runtime configuration.
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! backend: ollama
//! base_url: http://localhost:11434
//! model: cogito
//! language: en
//! max_tokens: 2048
//! keep_alive: 0
//! connect_timeout: 10s
//! idle_timeout: 2m
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabfact_core::prompt::DEFAULT_MAX_TOKENS;
use tabfact_core::InferenceRequest;
use thiserror::Error;

/// Selects the backend type.
pub const ENV_BACKEND: &str = "TABFACT_BACKEND";
/// Overrides the backend base URL.
pub const ENV_BASE_URL: &str = "TABFACT_BASE_URL";
/// Overrides the default model.
pub const ENV_MODEL: &str = "TABFACT_MODEL";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the fact-check runtime.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Registered backend type ("ollama" or "inference-api")
    pub backend: String,

    /// Backend address; the backend's default when unset
    pub base_url: Option<String>,

    /// Model used when a request does not name one
    pub model: String,

    /// Answer language passed into the prompt
    pub language: String,

    pub max_tokens: u32,

    /// Seconds the server keeps the model loaded after a run
    pub keep_alive: i64,

    /// Bound on connection setup
    #[serde(with = "duration_text")]
    pub connect_timeout: Duration,

    /// Longest gap allowed between two chunks of a running stream
    #[serde(with = "duration_text")]
    pub idle_timeout: Duration,

    /// Bearer token for the web service
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Durations as humantime text ("90s", "2m"), or bare seconds.
mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            base_url: None,
            model: "cogito".to_string(),
            language: "en".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            keep_alive: 0,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("max_tokens", &self.max_tokens)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RuntimeConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded runtime config");
        Self::from_yaml(&yaml)
    }

    /// Apply `TABFACT_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = get(ENV_BACKEND) {
            self.backend = backend;
        }
        if let Some(base_url) = get(ENV_BASE_URL) {
            self.base_url = Some(base_url);
        }
        if let Some(model) = get(ENV_MODEL) {
            self.model = model;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::Invalid("backend must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".to_string()));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid("idle_timeout must be positive".to_string()));
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    /// JSON handed to [`crate::BackendRegistry::create`].
    pub fn backend_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "connect_timeout_secs": self.connect_timeout.as_secs(),
        });
        if let Some(base_url) = &self.base_url {
            json["base_url"] = serde_json::Value::String(base_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            json["api_key"] = serde_json::Value::String(api_key.clone());
        }
        json
    }

    /// Request for `table`/`claim` with this config's model and limits.
    pub fn request(
        &self,
        table_text: impl Into<String>,
        claim_text: impl Into<String>,
    ) -> InferenceRequest {
        InferenceRequest::new(table_text, claim_text, self.model.clone())
            .with_language(self.language.clone())
            .with_max_tokens(self.max_tokens)
            .with_keep_alive(self.keep_alive)
    }
}
