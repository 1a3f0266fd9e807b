//! Backend for the fact-check web service.
//!
//! The service accepts the raw [`InferenceRequest`] at `/api/inference`,
//! builds the prompt server-side and streams NDJSON token events back.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tabfact_core::{InferenceRequest, Table};

use super::{
    factory::BackendFactory,
    http::{build_client, ensure_success, into_byte_stream, map_send_error},
    secrets::{ApiCredential, CredentialSource},
    validate_base_url, ByteStream, InferenceBackend, ProviderError,
};

/// Environment variable holding an optional bearer token.
pub const INFERENCE_API_TOKEN_ENV: &str = "TABFACT_API_TOKEN";

/// Default address of the web service.
pub const INFERENCE_API_DEFAULT_URL: &str = "http://localhost:8000";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming client for the fact-check web service.
pub struct InferenceApiBackend {
    base_url: String,
    credential: Option<ApiCredential>,
    connect_timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for InferenceApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceApiBackend")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct LoadModelRequest<'a> {
    model_name: &'a str,
}

impl InferenceApiBackend {
    /// Create a backend without credentials.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;
        Ok(Self {
            base_url,
            credential: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client: build_client(DEFAULT_CONNECT_TIMEOUT)?,
        })
    }

    /// Attach a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(ApiCredential::new(
            token,
            CredentialSource::Programmatic,
            "Inference API token",
        ));
        self
    }

    /// Create from JSON configuration with environment fallback for the token.
    ///
    /// Recognised keys: `base_url`, `api_key`, `connect_timeout_secs`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(INFERENCE_API_DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();
        validate_base_url(&base_url)?;

        let connect_timeout = config["connect_timeout_secs"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            INFERENCE_API_TOKEN_ENV,
            "Inference API token",
        );
        if let Some(credential) = &credential {
            tracing::debug!(source = %credential.source(), "using inference API token");
        }

        Ok(Self {
            base_url,
            credential,
            connect_timeout,
            client: build_client(connect_timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}{}", self.base_url, path));
        match &self.credential {
            // Exposed only at the point of use
            Some(credential) => builder.bearer_auth(credential.expose()),
            None => builder,
        }
    }
}

#[async_trait]
impl InferenceBackend for InferenceApiBackend {
    async fn open_stream(&self, request: &InferenceRequest) -> Result<ByteStream, ProviderError> {
        // Fail fast on input the server would reject anyway.
        Table::parse(&request.table_text)?;
        tracing::debug!(model = %request.model, backend = "inference-api", "opening inference stream");

        let response = self
            .post("/api/inference")
            .json(request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.connect_timeout))?;

        Ok(into_byte_stream(ensure_success(response).await?))
    }

    async fn preload(&self, model: &str) -> Result<(), ProviderError> {
        let response = self
            .post("/model/load")
            .json(&LoadModelRequest { model_name: model })
            .send()
            .await
            .map_err(|e| map_send_error(e, self.connect_timeout))?;
        ensure_success(response).await?;

        tracing::info!(model, backend = "inference-api", "model loaded");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!(error = %e, "inference API health check failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "inference-api"
    }
}

/// Factory for creating web-service backends from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://localhost:8000",  // Optional
///   "api_key": "...",                      // Optional, falls back to TABFACT_API_TOKEN env
///   "connect_timeout_secs": 10             // Optional
/// }
/// ```
pub struct InferenceApiBackendFactory;

impl BackendFactory for InferenceApiBackendFactory {
    fn backend_type(&self) -> &'static str {
        "inference-api"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn InferenceBackend>, ProviderError> {
        Ok(Arc::new(InferenceApiBackend::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(url) = config["base_url"].as_str() {
            validate_base_url(url)?;
        }
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "base_url": INFERENCE_API_DEFAULT_URL })
    }

    fn description(&self) -> &'static str {
        "Fact-check web service, prompt built server-side"
    }
}
