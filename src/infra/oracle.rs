// Verification oracle client (Onfido REST API)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::Attachment;
use crate::core::resilience::{create_circuit_breaker, execute_with_cb, UpstreamCircuitBreaker};
use crate::infra::{build_http_client, ensure_success, map_send_error, read_json};

const SERVICE: &str = "verification-oracle";

/// Reports requested for every check
pub const CHECK_REPORTS: &[&str] = &["document", "facial_similarity_photo"];

/// Document type sent with the national ID upload
pub const NATIONAL_ID_DOCUMENT_TYPE: &str = "national_identity_card";

/// Applicant identity sent to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ApplicantDetails {
    /// First word is the first name, the remainder the last name
    ///
    /// A single-word name is used for both, since the oracle requires each.
    pub fn from_profile(fullnames: &str, email: &str) -> Self {
        let mut words = fullnames.split_whitespace();
        let first_name = words.next().unwrap_or_default().to_string();
        let rest = words.collect::<Vec<_>>().join(" ");
        let last_name = if rest.is_empty() { first_name.clone() } else { rest };

        Self {
            first_name,
            last_name,
            email: email.to_string(),
        }
    }
}

/// Check state as reported by the oracle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckSummary {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// One report within a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReportList {
    reports: Vec<CheckReport>,
}

#[derive(Debug, Serialize)]
struct CreateCheckRequest<'a> {
    applicant_id: &'a str,
    report_names: &'a [&'a str],
}

/// Third-party identity verification
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    async fn create_applicant(&self, details: &ApplicantDetails) -> ServiceResult<String>;
    async fn upload_document(&self, applicant_id: &str, document: &Attachment) -> ServiceResult<String>;
    async fn upload_live_photo(&self, applicant_id: &str, photo: &Attachment) -> ServiceResult<String>;
    /// Start a check with `CHECK_REPORTS`; returns the check id
    async fn create_check(&self, applicant_id: &str) -> ServiceResult<String>;
    async fn find_check(&self, check_id: &str) -> ServiceResult<CheckSummary>;
    async fn list_reports(&self, check_id: &str) -> ServiceResult<Vec<CheckReport>>;
}

pub struct OnfidoClient {
    http_client: Client,
    base_url: String,
    api_token: Secret<String>,
    cb: UpstreamCircuitBreaker,
}

impl OnfidoClient {
    pub fn new(config: &Config) -> ServiceResult<Self> {
        Ok(Self {
            http_client: build_http_client(config.upstream_timeout_secs)?,
            base_url: config.onfido_base_url.trim_end_matches('/').to_string(),
            api_token: Secret::new(config.onfido_api_token.expose_secret().clone()),
            cb: create_circuit_breaker(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(
            "Authorization",
            format!("Token token={}", self.api_token.expose_secret()),
        )
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> ServiceResult<T> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| map_send_error(SERVICE, e))?;
        read_json(SERVICE, ensure_success(SERVICE, response).await?).await
    }

    fn file_part(attachment: &Attachment) -> ServiceResult<Part> {
        Part::bytes(attachment.bytes.to_vec())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid content type: {}", e)))
    }

    async fn create_applicant_internal(&self, details: &ApplicantDetails) -> ServiceResult<String> {
        let url = format!("{}/applicants", self.base_url);
        let body: IdResponse = self.send(self.http_client.post(url).json(details)).await?;
        info!(applicant_id = %body.id, "Applicant created");
        Ok(body.id)
    }

    async fn upload_document_internal(&self, applicant_id: &str, document: &Attachment) -> ServiceResult<String> {
        let form = Form::new()
            .text("applicant_id", applicant_id.to_string())
            .text("type", NATIONAL_ID_DOCUMENT_TYPE)
            .text("file_type", document.file_type().to_string())
            .part("file", Self::file_part(document)?);

        let url = format!("{}/documents", self.base_url);
        let body: IdResponse = self.send(self.http_client.post(url).multipart(form)).await?;
        debug!(applicant_id, document_id = %body.id, "Document uploaded");
        Ok(body.id)
    }

    async fn upload_live_photo_internal(&self, applicant_id: &str, photo: &Attachment) -> ServiceResult<String> {
        let form = Form::new()
            .text("applicant_id", applicant_id.to_string())
            .part("file", Self::file_part(photo)?);

        let url = format!("{}/live_photos", self.base_url);
        let body: IdResponse = self.send(self.http_client.post(url).multipart(form)).await?;
        debug!(applicant_id, live_photo_id = %body.id, "Live photo uploaded");
        Ok(body.id)
    }

    async fn create_check_internal(&self, applicant_id: &str) -> ServiceResult<String> {
        let url = format!("{}/checks", self.base_url);
        let request = CreateCheckRequest {
            applicant_id,
            report_names: CHECK_REPORTS,
        };
        let body: IdResponse = self.send(self.http_client.post(url).json(&request)).await?;
        info!(applicant_id, check_id = %body.id, "Check created");
        Ok(body.id)
    }

    async fn find_check_internal(&self, check_id: &str) -> ServiceResult<CheckSummary> {
        let url = format!("{}/checks/{}", self.base_url, check_id);
        self.send(self.http_client.get(url)).await
    }

    async fn list_reports_internal(&self, check_id: &str) -> ServiceResult<Vec<CheckReport>> {
        let url = format!("{}/reports", self.base_url);
        let body: ReportList = self
            .send(self.http_client.get(url).query(&[("check_id", check_id)]))
            .await?;
        Ok(body.reports)
    }
}

#[async_trait]
impl VerificationOracle for OnfidoClient {
    async fn create_applicant(&self, details: &ApplicantDetails) -> ServiceResult<String> {
        execute_with_cb(&self.cb, SERVICE, || self.create_applicant_internal(details)).await
    }

    async fn upload_document(&self, applicant_id: &str, document: &Attachment) -> ServiceResult<String> {
        execute_with_cb(&self.cb, SERVICE, || self.upload_document_internal(applicant_id, document)).await
    }

    async fn upload_live_photo(&self, applicant_id: &str, photo: &Attachment) -> ServiceResult<String> {
        execute_with_cb(&self.cb, SERVICE, || self.upload_live_photo_internal(applicant_id, photo)).await
    }

    async fn create_check(&self, applicant_id: &str) -> ServiceResult<String> {
        execute_with_cb(&self.cb, SERVICE, || self.create_check_internal(applicant_id)).await
    }

    async fn find_check(&self, check_id: &str) -> ServiceResult<CheckSummary> {
        execute_with_cb(&self.cb, SERVICE, || self.find_check_internal(check_id)).await
    }

    async fn list_reports(&self, check_id: &str) -> ServiceResult<Vec<CheckReport>> {
        execute_with_cb(&self.cb, SERVICE, || self.list_reports_internal(check_id)).await
    }
}
