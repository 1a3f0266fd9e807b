//! Inference backend abstractions for tabfact-runtime.
//!
//! A backend turns an [`InferenceRequest`] into a raw byte stream of
//! newline-delimited JSON token events. Framing, segmentation and verdict
//! extraction happen downstream in the session, so every backend shares
//! the same parsing path.
//!
//! ## Security
//!
//! Backends that need a credential use the [`secrets`] module.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use tabfact_core::{InferenceRequest, TableError};
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod inference_api;
#[cfg(feature = "http")]
mod ollama;

pub use factory::{BackendFactory, BackendRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "http")]
pub use inference_api::{InferenceApiBackend, InferenceApiBackendFactory};
#[cfg(feature = "http")]
pub use ollama::{OllamaBackend, OllamaBackendFactory};

/// Errors from inference backends.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Stream read failed: {0}")]
    StreamError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl From<TableError> for ProviderError {
    fn from(e: TableError) -> Self {
        ProviderError::InvalidRequest(e.to_string())
    }
}

/// Raw response body, chunk by chunk, as read from the transport.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Backend abstraction allows swapping inference servers.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Submit a request and return the streamed NDJSON body.
    ///
    /// Returns once the server has accepted the request; the body is read
    /// lazily by the caller.
    async fn open_stream(&self, request: &InferenceRequest) -> Result<ByteStream, ProviderError>;

    /// Ask the server to load a model ahead of the first request.
    async fn preload(&self, model: &str) -> Result<(), ProviderError>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> bool;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Reject base URLs that reqwest would not accept as HTTP endpoints.
pub(crate) fn validate_base_url(url: &str) -> Result<(), ProviderError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ProviderError::NotConfigured(
            "base_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}
