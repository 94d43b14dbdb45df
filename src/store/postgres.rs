// Postgres-backed repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{
    BlobRef, KycStatus, NewUser, NewVerification, RefreshTokenRecord, TransitionOutcome, User,
    VerificationRecord,
};
use crate::store::{RefreshTokenRepository, UserRepository, VerificationRepository};

const USER_COLUMNS: &str = "id, email, username, fullnames, password_hash, is_email_verified, \
                            is_kyc_passed, role, created_at";

const KYC_COLUMNS: &str = "id, user_id, national_id_url, national_id_public_id, selfie_url, \
                           selfie_public_id, status, onfido_applicant_id, onfido_check_id, \
                           created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    fullnames: String,
    password_hash: String,
    is_email_verified: bool,
    is_kyc_passed: bool,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.id,
            email: r.email,
            username: r.username,
            fullnames: r.fullnames,
            password_hash: r.password_hash,
            is_email_verified: r.is_email_verified,
            is_kyc_passed: r.is_kyc_passed,
            role: r.role.parse()?,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct KycRow {
    id: Uuid,
    user_id: Uuid,
    national_id_url: String,
    national_id_public_id: String,
    selfie_url: String,
    selfie_public_id: String,
    status: String,
    onfido_applicant_id: Option<String>,
    onfido_check_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<KycRow> for VerificationRecord {
    type Error = ServiceError;

    fn try_from(r: KycRow) -> Result<Self, Self::Error> {
        Ok(VerificationRecord {
            id: r.id,
            user_id: r.user_id,
            national_id: BlobRef {
                url: r.national_id_url,
                public_id: r.national_id_public_id,
            },
            selfie: BlobRef {
                url: r.selfie_url,
                public_id: r.selfie_public_id,
            },
            status: r.status.parse()?,
            onfido_applicant_id: r.onfido_applicant_id,
            onfido_check_id: r.onfido_check_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    token_hash: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Repositories over a shared connection pool
#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Connect, then apply pending migrations from `migrations/`
    pub async fn connect(database_url: &str, max_connections: u32) -> ServiceResult<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .map_err(|e| ServiceError::StorageError(format!("Migration failed: {}", e)))?;

        Ok(Self { db_pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, user: NewUser) -> ServiceResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, username, fullnames, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.fullnames)
            .bind(&user.password_hash)
            .fetch_one(&self.db_pool)
            .await?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db_pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn exists_by_email_or_username(&self, email: &str, username: &str) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.db_pool)
        .await?;
        Ok(exists)
    }

    async fn set_kyc_passed(&self, id: Uuid, passed: bool) -> ServiceResult<()> {
        sqlx::query("UPDATE users SET is_kyc_passed = $2 WHERE id = $1")
            .bind(id)
            .bind(passed)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn insert(&self, record: RefreshTokenRecord) -> ServiceResult<()> {
        sqlx::query("INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&record.token_hash)
            .bind(record.user_id)
            .bind(record.expires_at)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT token_hash, user_id, expires_at FROM refresh_tokens \
             WHERE token_hash = $1 AND user_id = $2 AND expires_at >= $3",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(|r| RefreshTokenRecord {
            token_hash: r.token_hash,
            user_id: r.user_id,
            expires_at: r.expires_at,
        }))
    }

    async fn delete(&self, token_hash: &str, user_id: Uuid) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1 AND user_id = $2")
            .bind(token_hash)
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VerificationRepository for PgStore {
    async fn find_active(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>> {
        let sql = format!(
            "SELECT {} FROM kyc_docs WHERE user_id = $1 AND status IN ('REQUESTED', 'APPROVED') LIMIT 1",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(VerificationRecord::try_from)
            .transpose()
    }

    async fn insert(&self, new: NewVerification) -> ServiceResult<VerificationRecord> {
        let sql = format!(
            "INSERT INTO kyc_docs (id, user_id, national_id_url, national_id_public_id, \
             selfie_url, selfie_public_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'REQUESTED') RETURNING {}",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(&new.national_id.url)
            .bind(&new.national_id.public_id)
            .bind(&new.selfie.url)
            .bind(&new.selfie.public_id)
            .fetch_one(&self.db_pool)
            .await?
            .try_into()
    }

    async fn attach_oracle_ids(
        &self,
        id: Uuid,
        applicant_id: &str,
        check_id: &str,
    ) -> ServiceResult<VerificationRecord> {
        let sql = format!(
            "UPDATE kyc_docs SET onfido_applicant_id = $2, onfido_check_id = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(id)
            .bind(applicant_id)
            .bind(check_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFoundError("Verification record not found".to_string()))?
            .try_into()
    }

    async fn find_by_check_id(&self, check_id: &str) -> ServiceResult<Option<VerificationRecord>> {
        let sql = format!(
            "SELECT {} FROM kyc_docs WHERE onfido_check_id = $1 LIMIT 1",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(check_id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(VerificationRecord::try_from)
            .transpose()
    }

    async fn latest_for_user(&self, user_id: Uuid) -> ServiceResult<Option<VerificationRecord>> {
        let sql = format!(
            "SELECT {} FROM kyc_docs WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(VerificationRecord::try_from)
            .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<VerificationRecord>> {
        let sql = format!(
            "SELECT {} FROM kyc_docs WHERE user_id = $1 ORDER BY created_at DESC",
            KYC_COLUMNS
        );
        sqlx::query_as::<_, KycRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.db_pool)
            .await?
            .into_iter()
            .map(VerificationRecord::try_from)
            .collect()
    }

    async fn transition_by_check_id(
        &self,
        check_id: &str,
        status: KycStatus,
    ) -> ServiceResult<TransitionOutcome> {
        // Conditional on REQUESTED so a replayed or late webhook cannot move a terminal record
        let updated: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE kyc_docs SET status = $2, updated_at = NOW() \
             WHERE onfido_check_id = $1 AND status = 'REQUESTED' RETURNING user_id",
        )
        .bind(check_id)
        .bind(status.as_str())
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some((user_id,)) = updated {
            return Ok(TransitionOutcome::Applied { user_id, status });
        }

        let current: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, status FROM kyc_docs WHERE onfido_check_id = $1 LIMIT 1",
        )
        .bind(check_id)
        .fetch_optional(&self.db_pool)
        .await?;

        match current {
            Some((user_id, s)) => Ok(TransitionOutcome::AlreadyFinal {
                user_id,
                status: s.parse()?,
            }),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    async fn ping(&self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }
}
