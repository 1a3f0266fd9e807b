//! Ollama backend.
//!
//! Builds the fact-check prompt locally and streams `/api/generate`,
//! whose body is already one `{"response": ...}` object per line.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tabfact_core::{build_prompt, system_prompt, InferenceRequest};

use super::{
    factory::BackendFactory,
    http::{build_client, ensure_success, into_byte_stream, map_send_error},
    validate_base_url, ByteStream, InferenceBackend, ProviderError,
};

/// Default local Ollama endpoint.
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming client for a local Ollama server.
#[derive(Debug)]
pub struct OllamaBackend {
    base_url: String,
    connect_timeout: Duration,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(base_url, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;
        Ok(Self {
            base_url,
            connect_timeout,
            client: build_client(connect_timeout)?,
        })
    }

    /// Create from JSON configuration.
    ///
    /// Recognised keys: `base_url`, `connect_timeout_secs`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let base_url = config["base_url"].as_str().unwrap_or(OLLAMA_DEFAULT_URL);
        let connect_timeout = config["connect_timeout_secs"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        Self::with_timeout(base_url, connect_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn generate_body(request: &InferenceRequest) -> Result<GenerateRequest, ProviderError> {
        Ok(GenerateRequest {
            model: request.model.clone(),
            prompt: Some(build_prompt(request)?),
            system: system_prompt(request).map(str::to_string),
            stream: request.stream,
            keep_alive: Some(request.keep_alive),
            options: Some(GenerateOptions {
                num_predict: request.max_tokens,
            }),
        })
    }
}

/// `/api/generate` request body.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn open_stream(&self, request: &InferenceRequest) -> Result<ByteStream, ProviderError> {
        let body = Self::generate_body(request)?;
        tracing::debug!(model = %body.model, backend = "ollama", "opening generation stream");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.connect_timeout))?;

        Ok(into_byte_stream(ensure_success(response).await?))
    }

    async fn preload(&self, model: &str) -> Result<(), ProviderError> {
        // A generate call without a prompt only loads the model.
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: None,
            system: None,
            stream: false,
            keep_alive: None,
            options: None,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.connect_timeout))?;
        ensure_success(response).await?;

        tracing::info!(model, backend = "ollama", "model loaded");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama health check failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Factory for creating Ollama backends from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://localhost:11434",  // Optional
///   "connect_timeout_secs": 10              // Optional
/// }
/// ```
pub struct OllamaBackendFactory;

impl BackendFactory for OllamaBackendFactory {
    fn backend_type(&self) -> &'static str {
        "ollama"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn InferenceBackend>, ProviderError> {
        Ok(Arc::new(OllamaBackend::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(url) = config["base_url"].as_str() {
            validate_base_url(url)?;
        }
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "base_url": OLLAMA_DEFAULT_URL })
    }

    fn description(&self) -> &'static str {
        "Local Ollama server, prompt built client-side"
    }
}
