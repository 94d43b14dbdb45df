// Upstream HTTP clients: blob store and verification oracle

use reqwest::{Client, Response};
use std::time::Duration;
use tracing::error;

use crate::core::errors::{ServiceError, ServiceResult};

pub mod blob_store;
pub mod oracle;

pub use blob_store::{BlobStore, CloudinaryBlobStore};
pub use oracle::{CheckReport, CheckSummary, OnfidoClient, VerificationOracle};

/// Shared client builder: overall timeout plus a short connect timeout
pub(crate) fn build_http_client(timeout_secs: u64) -> ServiceResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(5)))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ServiceError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))
}

/// Transport failure to `UpstreamError`
pub(crate) fn map_send_error(service: &str, err: reqwest::Error) -> ServiceError {
    let detail = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        format!("request failed: {}", err)
    };
    ServiceError::upstream(service, detail)
}

/// Pass 2xx responses through; anything else becomes `UpstreamError` with the body logged
pub(crate) async fn ensure_success(service: &str, response: Response) -> ServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    error!(service, status = %status, path = %url, body = %body, "Upstream returned HTTP error");

    Err(ServiceError::upstream_status(
        service,
        status.as_u16(),
        format!("HTTP {} from {}", status.as_u16(), url),
    ))
}

/// Decode a JSON body, mapping malformed payloads to `UpstreamError`
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    service: &str,
    response: Response,
) -> ServiceResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::upstream(service, format!("malformed response: {}", e)))
}
