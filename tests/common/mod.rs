// Common test utilities and helpers for all test modules

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kyc_gateway::api::AppState;
use kyc_gateway::auth::audit_logger::AuditLogger;
use kyc_gateway::auth::{AuthTokens, Registration};
use kyc_gateway::config::Config;
use kyc_gateway::core::errors::{ServiceError, ServiceResult};
use kyc_gateway::core::models::{Attachment, BlobRef, Role};
use kyc_gateway::infra::oracle::ApplicantDetails;
use kyc_gateway::infra::{BlobStore, CheckReport, CheckSummary, VerificationOracle};
use kyc_gateway::kyc::KycSubmission;
use kyc_gateway::store::{MemoryStore, Repositories};

/// Mock BlobStore that tracks live objects
#[derive(Default)]
pub struct MockBlobStore {
    live: Mutex<Vec<BlobRef>>,
    deleted: Mutex<Vec<String>>,
    counter: AtomicUsize,
    /// Uploads into a folder ending with this suffix fail
    pub fail_folder_suffix: Mutex<Option<String>>,
    pub delete_should_fail: AtomicBool,
}

impl MockBlobStore {
    pub fn failing_on(suffix: &str) -> Self {
        let store = Self::default();
        *store.fail_folder_suffix.lock().unwrap() = Some(suffix.to_string());
        store
    }

    pub fn live(&self) -> Vec<BlobRef> {
        self.live.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload(&self, attachment: &Attachment, folder: &str) -> ServiceResult<BlobRef> {
        if let Some(ref suffix) = *self.fail_folder_suffix.lock().unwrap() {
            if folder.ends_with(suffix.as_str()) {
                return Err(ServiceError::upstream("blob-store", "HTTP 500"));
            }
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let public_id = format!("{}/{}-{}", folder, n, attachment.file_name);
        let blob = BlobRef {
            url: format!("https://blobs.test/{}", public_id),
            public_id,
        };
        self.live.lock().unwrap().push(blob.clone());
        Ok(blob)
    }

    async fn delete(&self, public_id: &str) -> ServiceResult<()> {
        if self.delete_should_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::upstream("blob-store", "HTTP 500"));
        }
        self.live.lock().unwrap().retain(|b| b.public_id != public_id);
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// Mock VerificationOracle with switchable failures and a settable check verdict
pub struct MockOracle {
    counter: AtomicUsize,
    pub applicants: Mutex<Vec<ApplicantDetails>>,
    pub check_status: Mutex<String>,
    pub check_result: Mutex<Option<String>>,
    pub create_applicant_should_fail: AtomicBool,
    pub create_check_should_fail: AtomicBool,
    pub find_check_should_fail: AtomicBool,
    pub find_check_calls: AtomicUsize,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            applicants: Mutex::new(Vec::new()),
            check_status: Mutex::new("in_progress".to_string()),
            check_result: Mutex::new(None),
            create_applicant_should_fail: AtomicBool::new(false),
            create_check_should_fail: AtomicBool::new(false),
            find_check_should_fail: AtomicBool::new(false),
            find_check_calls: AtomicUsize::new(0),
        }
    }
}

impl MockOracle {
    pub fn set_check(&self, status: &str, result: Option<&str>) {
        *self.check_status.lock().unwrap() = status.to_string();
        *self.check_result.lock().unwrap() = result.map(str::to_string);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl VerificationOracle for MockOracle {
    async fn create_applicant(&self, details: &ApplicantDetails) -> ServiceResult<String> {
        if self.create_applicant_should_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::upstream("verification-oracle", "request timed out"));
        }
        self.applicants.lock().unwrap().push(details.clone());
        Ok(self.next_id("app"))
    }

    async fn upload_document(&self, _applicant_id: &str, _document: &Attachment) -> ServiceResult<String> {
        Ok(self.next_id("doc"))
    }

    async fn upload_live_photo(&self, _applicant_id: &str, _photo: &Attachment) -> ServiceResult<String> {
        Ok(self.next_id("photo"))
    }

    async fn create_check(&self, _applicant_id: &str) -> ServiceResult<String> {
        if self.create_check_should_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::upstream("verification-oracle", "HTTP 422"));
        }
        Ok(self.next_id("chk"))
    }

    async fn find_check(&self, check_id: &str) -> ServiceResult<CheckSummary> {
        self.find_check_calls.fetch_add(1, Ordering::SeqCst);
        if self.find_check_should_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::upstream("verification-oracle", "connection failed"));
        }
        let status = self.check_status.lock().unwrap().clone();
        let result = self.check_result.lock().unwrap().clone();
        Ok(CheckSummary {
            id: check_id.to_string(),
            status,
            result,
        })
    }

    async fn list_reports(&self, _check_id: &str) -> ServiceResult<Vec<CheckReport>> {
        if self.find_check_should_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::upstream("verification-oracle", "connection failed"));
        }
        let status = self.check_status.lock().unwrap().clone();
        let result = self.check_result.lock().unwrap().clone();
        Ok(["document", "facial_similarity_photo"]
            .into_iter()
            .map(|name| CheckReport {
                name: name.to_string(),
                status: status.clone(),
                result: result.clone(),
            })
            .collect())
    }
}

/// Fully wired application over the in-memory store and mocks
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MockBlobStore>,
    pub oracle: Arc<MockOracle>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(MockBlobStore::default(), MockOracle::default(), Config::test_config())
    }

    pub fn with(blobs: MockBlobStore, oracle: MockOracle, config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(blobs);
        let oracle = Arc::new(oracle);

        let state = AppState::new(
            Arc::new(config),
            Repositories::memory(store.clone()),
            blobs.clone(),
            oracle.clone(),
            Arc::new(AuditLogger::new(None)),
        );

        Self {
            state,
            store,
            blobs,
            oracle,
        }
    }

    pub async fn register(&self, email: &str, username: &str) -> AuthTokens {
        self.state
            .credentials
            .register(registration(email, username))
            .await
            .unwrap()
    }

    /// Register and mark the email verified
    pub async fn verified_user(&self, email: &str, username: &str) -> AuthTokens {
        self.user_with_role(email, username, Role::User).await
    }

    pub async fn user_with_role(&self, email: &str, username: &str, role: Role) -> AuthTokens {
        let tokens = self.register(email, username).await;
        self.store
            .update_user_flags(tokens.user.id, true, role)
            .await
            .unwrap();
        tokens
    }
}

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn registration(email: &str, username: &str) -> Registration {
    Registration {
        fullnames: "Ada King Lovelace".to_string(),
        email: email.to_string(),
        username: username.to_string(),
        password: TEST_PASSWORD.to_string(),
    }
}

pub fn attachment(file_name: &str, content_type: &str) -> Attachment {
    Attachment {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake-image-bytes"),
    }
}

pub fn submission() -> KycSubmission {
    KycSubmission {
        national_id: attachment("national-id.pdf", "application/pdf"),
        selfie: attachment("selfie.png", "image/png"),
    }
}

/// Config with webhook signatures enforced
pub fn config_with_webhook_token(token: &str) -> Config {
    let mut config = Config::test_config();
    config.onfido_webhook_token = Some(secrecy::Secret::new(token.to_string()));
    config
}
