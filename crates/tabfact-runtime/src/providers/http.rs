//! Shared reqwest plumbing for HTTP backends.

use futures::StreamExt;
use std::time::Duration;

use super::{ByteStream, ProviderError};

/// Build a client for streaming requests.
///
/// Only connection setup is bounded here; a generation may legitimately
/// stream for minutes, and gaps between chunks are policed by the session.
pub(crate) fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| ProviderError::HttpError(e.to_string()))
}

pub(crate) fn map_send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(e.to_string())
    }
}

/// Turn a non-2xx response into an [`ProviderError::ApiError`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        }),
    })
}

/// Pull `error` / `detail` out of a JSON error body, or use the raw text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("error")
            .or_else(|| value.get("detail"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}

pub(crate) fn into_byte_stream(response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ProviderError::StreamError(e.to_string()))
        })
        .boxed()
}
