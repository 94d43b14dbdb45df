// Persistence seams: repository traits plus Postgres and in-memory implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::errors::ServiceResult;
use crate::core::models::{
    KycStatus, NewUser, NewVerification, RefreshTokenRecord, TransitionOutcome, User,
    VerificationRecord,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; `ConflictError` when the email or username is taken
    async fn create(&self, user: NewUser) -> ServiceResult<User>;
    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>>;
    async fn exists_by_email_or_username(&self, email: &str, username: &str) -> ServiceResult<bool>;
    async fn set_kyc_passed(&self, id: Uuid, passed: bool) -> ServiceResult<()>;
}

/// Issued refresh tokens, keyed by the SHA-256 of the token
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> ServiceResult<()>;
    /// Row matching hash and owner that has not expired at `now`
    async fn find_valid(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<RefreshTokenRecord>>;
    /// Delete matching rows; returns the number removed (zero is not an error)
    async fn delete(&self, token_hash: &str, user_id: Uuid) -> ServiceResult<u64>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> ServiceResult<u64>;
}

/// KYC verification records
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// Record in REQUESTED or APPROVED for the user, if any
    async fn find_active(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>>;
    /// Insert a REQUESTED record; `ConflictError` if one is already active
    async fn insert(&self, new: NewVerification) -> ServiceResult<VerificationRecord>;
    async fn attach_oracle_ids(
        &self,
        id: Uuid,
        applicant_id: &str,
        check_id: &str,
    ) -> ServiceResult<VerificationRecord>;
    async fn find_by_check_id(&self, check_id: &str) -> ServiceResult<Option<VerificationRecord>>;
    async fn latest_for_user(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>>;
    async fn list_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<VerificationRecord>>;
    /// Move the record holding `check_id` from REQUESTED to `status`
    ///
    /// Terminal records are left untouched, so replays are harmless.
    async fn transition_by_check_id(
        &self,
        check_id: &str,
        status: KycStatus,
    ) -> ServiceResult<TransitionOutcome>;
    async fn ping(&self) -> ServiceResult<()>;
}

/// The three repositories behind one handle
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self::memory(Arc::new(MemoryStore::new()))
    }

    /// Share an existing in-memory store (callers keep a handle for seeding)
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self::from_store(store)
    }

    pub fn postgres(store: PgStore) -> Self {
        Self::from_store(Arc::new(store))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository + RefreshTokenRepository + VerificationRepository + 'static,
    {
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            verifications: store,
        }
    }
}
