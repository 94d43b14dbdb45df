// KYC workflow: upload, record, submit to the oracle, and apply verdicts

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{
    BlobRef, KycStatus, NewVerification, TransitionOutcome, UserSummary, VerificationRecord,
};
use crate::infra::oracle::{ApplicantDetails, CheckReport, CheckSummary};
use crate::infra::{BlobStore, VerificationOracle};
use crate::kyc::attachments::KycSubmission;
use crate::kyc::webhook::WebhookEvent;
use crate::store::{UserRepository, VerificationRepository};

/// Status reported when a user has never submitted
pub const NOT_SUBMITTED: &str = "NOT_SUBMITTED";

const CHECK_STATUS_COMPLETE: &str = "complete";
const CHECK_RESULT_CLEAR: &str = "clear";

/// Read-only view returned by the status query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusView {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onfido_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<Vec<CheckReport>>,
}

/// What a callback did to local state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a completed-check event
    Ignored,
    /// The oracle does not consider the check complete yet
    Pending,
    Applied(KycStatus),
    AlreadyFinal(KycStatus),
    /// No local record references the check
    UnknownCheck,
}

/// Map an oracle check to a terminal status, if it has one
pub fn verdict(check: &CheckSummary) -> Option<KycStatus> {
    if check.status != CHECK_STATUS_COMPLETE {
        return None;
    }
    match check.result.as_deref() {
        Some(CHECK_RESULT_CLEAR) => Some(KycStatus::Approved),
        _ => Some(KycStatus::Rejected),
    }
}

pub struct KycOrchestrator {
    users: Arc<dyn UserRepository>,
    verifications: Arc<dyn VerificationRepository>,
    blob_store: Arc<dyn BlobStore>,
    oracle: Arc<dyn VerificationOracle>,
    folder: String,
}

impl KycOrchestrator {
    pub fn new(
        users: Arc<dyn UserRepository>,
        verifications: Arc<dyn VerificationRepository>,
        blob_store: Arc<dyn BlobStore>,
        oracle: Arc<dyn VerificationOracle>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            users,
            verifications,
            blob_store,
            oracle,
            folder: folder.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn documents_folder(&self) -> String {
        format!("{}/documents", self.folder)
    }

    pub fn selfies_folder(&self) -> String {
        format!("{}/selfies", self.folder)
    }

    /// Start a verification for `user`
    ///
    /// Upload failures leave nothing behind. An oracle failure after the record
    /// exists leaves it REQUESTED with its blobs intact.
    pub async fn submit(
        &self,
        user: &UserSummary,
        submission: KycSubmission,
    ) -> ServiceResult<VerificationRecord> {
        if let Some(existing) = self.verifications.find_active(user.id).await? {
            info!(user_id = %user.id, status = %existing.status, "Submission rejected: verification already active");
            return Err(ServiceError::ConflictError(
                "KYC verification is already in progress or approved".to_string(),
            ));
        }

        let documents_folder = self.documents_folder();
        let selfies_folder = self.selfies_folder();
        let (national_id, selfie) = tokio::join!(
            self.blob_store.upload(&submission.national_id, &documents_folder),
            self.blob_store.upload(&submission.selfie, &selfies_folder),
        );

        let (national_id, selfie) = match (national_id, selfie) {
            (Ok(n), Ok(s)) => (n, s),
            (Ok(n), Err(e)) => {
                self.discard(user.id, &[&n]).await;
                return Err(e);
            }
            (Err(e), Ok(s)) => {
                self.discard(user.id, &[&s]).await;
                return Err(e);
            }
            (Err(e), Err(_)) => return Err(e),
        };

        let record = match self
            .verifications
            .insert(NewVerification {
                user_id: user.id,
                national_id: national_id.clone(),
                selfie: selfie.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.discard(user.id, &[&national_id, &selfie]).await;
                return Err(e);
            }
        };

        info!(user_id = %user.id, record_id = %record.id, "Verification record created");

        let (applicant_id, check_id) = match self.submit_to_oracle(user, &submission).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(
                    user_id = %user.id,
                    record_id = %record.id,
                    error = %e,
                    "Oracle submission failed; record left REQUESTED"
                );
                return Err(e);
            }
        };

        self.verifications
            .attach_oracle_ids(record.id, &applicant_id, &check_id)
            .await
    }

    async fn submit_to_oracle(
        &self,
        user: &UserSummary,
        submission: &KycSubmission,
    ) -> ServiceResult<(String, String)> {
        let details = ApplicantDetails::from_profile(&user.fullnames, &user.email);
        let applicant_id = self.oracle.create_applicant(&details).await?;

        tokio::try_join!(
            self.oracle.upload_document(&applicant_id, &submission.national_id),
            self.oracle.upload_live_photo(&applicant_id, &submission.selfie),
        )?;

        let check_id = self.oracle.create_check(&applicant_id).await?;
        Ok((applicant_id, check_id))
    }

    /// Best-effort deletion of orphaned blobs; failures are logged only
    async fn discard(&self, user_id: Uuid, blobs: &[&BlobRef]) {
        for blob in blobs {
            if let Err(e) = self.blob_store.delete(&blob.public_id).await {
                warn!(
                    user_id = %user_id,
                    public_id = %blob.public_id,
                    error = %e,
                    "Compensating blob deletion failed"
                );
            }
        }
    }

    /// Apply an oracle callback
    ///
    /// Only checks referenced by a local record reach the oracle. The verdict comes
    /// from re-reading the check, and only a REQUESTED record moves. Redelivery of an
    /// approval re-applies the user's KYC flag.
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> ServiceResult<WebhookOutcome> {
        let check_id = match event.completed_check_id() {
            Some(id) => id,
            None => {
                info!(
                    resource_type = %event.resource_type,
                    action = %event.action,
                    "Ignoring webhook event"
                );
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let record = match self.verifications.find_by_check_id(check_id).await? {
            Some(record) => record,
            None => {
                warn!(check_id, "Webhook references unknown check");
                return Ok(WebhookOutcome::UnknownCheck);
            }
        };

        if record.status.is_terminal() {
            return self.already_final(check_id, record.user_id, record.status).await;
        }

        let check = self.oracle.find_check(check_id).await?;
        let status = match verdict(&check) {
            Some(status) => status,
            None => {
                info!(check_id, oracle_status = %check.status, "Check not complete; nothing to apply");
                return Ok(WebhookOutcome::Pending);
            }
        };

        match self.verifications.transition_by_check_id(check_id, status).await? {
            TransitionOutcome::Applied { user_id, status } => {
                if status == KycStatus::Approved {
                    self.users.set_kyc_passed(user_id, true).await?;
                }
                info!(check_id, user_id = %user_id, status = %status, "Verification status updated");
                Ok(WebhookOutcome::Applied(status))
            }
            TransitionOutcome::AlreadyFinal { user_id, status } => {
                self.already_final(check_id, user_id, status).await
            }
            TransitionOutcome::NotFound => {
                warn!(check_id, "Webhook references unknown check");
                Ok(WebhookOutcome::UnknownCheck)
            }
        }
    }

    /// Replay of a terminal record; an approval re-sets the user flag in case
    /// the first delivery failed after the transition
    async fn already_final(
        &self,
        check_id: &str,
        user_id: Uuid,
        status: KycStatus,
    ) -> ServiceResult<WebhookOutcome> {
        if status == KycStatus::Approved {
            self.users.set_kyc_passed(user_id, true).await?;
        }
        info!(check_id, status = %status, "Verification already final; replay ignored");
        Ok(WebhookOutcome::AlreadyFinal(status))
    }

    /// Latest status for `user_id`, with the live oracle view when reachable
    pub async fn status(&self, user_id: Uuid) -> ServiceResult<KycStatusView> {
        let record = match self.verifications.latest_for_user(user_id).await? {
            Some(record) => record,
            None => {
                return Ok(KycStatusView {
                    status: NOT_SUBMITTED.to_string(),
                    onfido_status: None,
                    reports: None,
                })
            }
        };

        let mut view = KycStatusView {
            status: record.status.to_string(),
            onfido_status: None,
            reports: None,
        };

        if let Some(check_id) = record.onfido_check_id.as_deref() {
            match tokio::try_join!(self.oracle.find_check(check_id), self.oracle.list_reports(check_id)) {
                Ok((check, reports)) => {
                    view.onfido_status = Some(check.status);
                    view.reports = Some(reports);
                }
                Err(e) => warn!(check_id, error = %e, "Oracle status unavailable; returning local status"),
            }
        }

        Ok(view)
    }

    /// Every record of a user, newest first
    pub async fn records_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<VerificationRecord>> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(ServiceError::NotFoundError("User not found".to_string()));
        }
        self.verifications.list_for_user(user_id).await
    }
}
