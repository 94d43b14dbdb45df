// Blob store client (Cloudinary upload API)

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::Config;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{Attachment, BlobRef};
use crate::core::resilience::{create_circuit_breaker, execute_with_cb, UpstreamCircuitBreaker};
use crate::infra::{build_http_client, ensure_success, map_send_error, read_json};

const SERVICE: &str = "blob-store";

/// Object storage for submitted documents
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the attachment under `folder`; returns its URL and deletion handle
    async fn upload(&self, attachment: &Attachment, folder: &str) -> ServiceResult<BlobRef>;
    /// Remove an object; deleting an unknown handle succeeds
    async fn delete(&self, public_id: &str) -> ServiceResult<()>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Signed-upload client
///
/// Everything goes to the `image` resource type, which also accepts PDFs,
/// so deletion never needs to know what kind of file a handle refers to.
pub struct CloudinaryBlobStore {
    http_client: Client,
    base_url: String,
    api_key: String,
    api_secret: Secret<String>,
    cb: UpstreamCircuitBreaker,
}

impl CloudinaryBlobStore {
    pub fn new(config: &Config) -> ServiceResult<Self> {
        Ok(Self {
            http_client: build_http_client(config.upstream_timeout_secs)?,
            base_url: config.cloudinary_base_url.trim_end_matches('/').to_string(),
            api_key: config.cloudinary_api_key.clone(),
            api_secret: Secret::new(config.cloudinary_api_secret.expose_secret().clone()),
            cb: create_circuit_breaker(),
        })
    }

    /// SHA-256 over the sorted `key=value` pairs joined by `&`, followed by the API secret
    fn sign(&self, params: &mut Vec<(&str, String)>) -> String {
        params.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn upload_internal(&self, attachment: &Attachment, folder: &str) -> ServiceResult<BlobRef> {
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![("folder", folder.to_string()), ("timestamp", timestamp.clone())];
        let signature = self.sign(&mut params);

        let file = Part::bytes(attachment.bytes.to_vec())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid content type: {}", e)))?;

        let form = Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("folder", folder.to_string())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!("{}/image/upload", self.base_url);
        debug!(folder, size = attachment.bytes.len(), "Uploading blob");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_send_error(SERVICE, e))?;

        let body: UploadResponse = read_json(SERVICE, ensure_success(SERVICE, response).await?).await?;
        info!(public_id = %body.public_id, "Blob uploaded");

        Ok(BlobRef {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    async fn delete_internal(&self, public_id: &str) -> ServiceResult<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![("public_id", public_id.to_string()), ("timestamp", timestamp.clone())];
        let signature = self.sign(&mut params);

        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!("{}/image/destroy", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_send_error(SERVICE, e))?;

        let body: DestroyResponse = read_json(SERVICE, ensure_success(SERVICE, response).await?).await?;
        match body.result.as_str() {
            "ok" | "not found" => {
                info!(public_id, result = %body.result, "Blob deleted");
                Ok(())
            }
            other => Err(ServiceError::upstream(SERVICE, format!("destroy returned '{}'", other))),
        }
    }
}

#[async_trait]
impl BlobStore for CloudinaryBlobStore {
    async fn upload(&self, attachment: &Attachment, folder: &str) -> ServiceResult<BlobRef> {
        execute_with_cb(&self.cb, SERVICE, || self.upload_internal(attachment, folder)).await
    }

    async fn delete(&self, public_id: &str) -> ServiceResult<()> {
        execute_with_cb(&self.cb, SERVICE, || self.delete_internal(public_id)).await
    }
}
