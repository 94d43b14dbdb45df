// In-memory repositories for development without a database and for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{
    KycStatus, NewUser, NewVerification, RefreshTokenRecord, Role, TransitionOutcome, User,
    VerificationRecord,
};
use crate::store::{RefreshTokenRepository, UserRepository, VerificationRepository};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    refresh_tokens: Vec<RefreshTokenRecord>,
    verifications: Vec<VerificationRecord>,
}

/// Store holding everything behind one lock
///
/// Uniqueness rules mirror the database constraints, so behaviour matches `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite profile flags and role (seeding helper; no HTTP route does this)
    pub async fn update_user_flags(
        &self,
        id: Uuid,
        is_email_verified: bool,
        role: Role,
    ) -> ServiceResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFoundError("User not found".to_string()))?;
        user.is_email_verified = is_email_verified;
        user.role = role;
        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.users.remove(&id);
        inner.refresh_tokens.retain(|t| t.user_id != id);
    }

    pub async fn refresh_token_count(&self, user_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner.refresh_tokens.iter().filter(|t| t.user_id == user_id).count()
    }

    pub async fn verification_count(&self, user_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner.verifications.iter().filter(|v| v.user_id == user_id).count()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: NewUser) -> ServiceResult<User> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username);
        if taken {
            return Err(ServiceError::ConflictError(
                "Email or username already in use".to_string(),
            ));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            fullnames: user.fullnames,
            password_hash: user.password_hash,
            is_email_verified: false,
            is_kyc_passed: false,
            role: Role::User,
            created_at: Utc::now(),
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_email_or_username(&self, email: &str, username: &str) -> ServiceResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .any(|u| u.email == email || u.username == username))
    }

    async fn set_kyc_passed(&self, id: Uuid, passed: bool) -> ServiceResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.is_kyc_passed = passed;
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn insert(&self, record: RefreshTokenRecord) -> ServiceResult<()> {
        let mut inner = self.inner.write().await;
        if inner.refresh_tokens.iter().any(|t| t.token_hash == record.token_hash) {
            return Err(ServiceError::ConflictError("Resource already exists".to_string()));
        }
        inner.refresh_tokens.push(record);
        Ok(())
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<RefreshTokenRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .refresh_tokens
            .iter()
            .find(|t| t.token_hash == token_hash && t.user_id == user_id && t.expires_at >= now)
            .cloned())
    }

    async fn delete(&self, token_hash: &str, user_id: Uuid) -> ServiceResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.refresh_tokens.len();
        inner
            .refresh_tokens
            .retain(|t| !(t.token_hash == token_hash && t.user_id == user_id));
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|t| t.expires_at >= now);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl VerificationRepository for MemoryStore {
    async fn find_active(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .verifications
            .iter()
            .find(|v| v.user_id == user_id && v.status.is_active())
            .cloned())
    }

    async fn insert(&self, new: NewVerification) -> ServiceResult<VerificationRecord> {
        let mut inner = self.inner.write().await;
        if inner
            .verifications
            .iter()
            .any(|v| v.user_id == new.user_id && v.status.is_active())
        {
            return Err(ServiceError::ConflictError(
                "KYC verification is already in progress or approved".to_string(),
            ));
        }

        let now = Utc::now();
        let record = VerificationRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            national_id: new.national_id,
            selfie: new.selfie,
            status: KycStatus::Requested,
            onfido_applicant_id: None,
            onfido_check_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.verifications.push(record.clone());
        Ok(record)
    }

    async fn attach_oracle_ids(
        &self,
        id: Uuid,
        applicant_id: &str,
        check_id: &str,
    ) -> ServiceResult<VerificationRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .verifications
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| ServiceError::NotFoundError("Verification record not found".to_string()))?;
        record.onfido_applicant_id = Some(applicant_id.to_string());
        record.onfido_check_id = Some(check_id.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn find_by_check_id(&self, check_id: &str) -> ServiceResult<Option<VerificationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .verifications
            .iter()
            .find(|v| v.onfido_check_id.as_deref() == Some(check_id))
            .cloned())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .verifications
            .iter()
            .filter(|v| v.user_id == user_id)
            .max_by_key(|v| v.created_at)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<VerificationRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .verifications
            .iter()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn transition_by_check_id(
        &self,
        check_id: &str,
        status: KycStatus,
    ) -> ServiceResult<TransitionOutcome> {
        let mut inner = self.inner.write().await;
        let record = match inner
            .verifications
            .iter_mut()
            .find(|v| v.onfido_check_id.as_deref() == Some(check_id))
        {
            Some(record) => record,
            None => return Ok(TransitionOutcome::NotFound),
        };

        if record.status != KycStatus::Requested {
            return Ok(TransitionOutcome::AlreadyFinal {
                user_id: record.user_id,
                status: record.status,
            });
        }

        record.status = status;
        record.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied {
            user_id: record.user_id,
            status,
        })
    }

    async fn ping(&self) -> ServiceResult<()> {
        Ok(())
    }
}
