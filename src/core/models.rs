// Domain models shared across services, stores and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::errors::ServiceError;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(ServiceError::StorageError(format!("Unknown role '{}'", other))),
        }
    }
}

/// Persisted user account
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub fullnames: String,
    pub password_hash: String,
    pub is_email_verified: bool,
    pub is_kyc_passed: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub fullnames: String,
    pub password_hash: String,
}

/// Public projection of a user, also the authenticated identity snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub fullnames: String,
    pub is_email_verified: bool,
    pub is_kyc_passed: bool,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            fullnames: user.fullnames.clone(),
            is_email_verified: user.is_email_verified,
            is_kyc_passed: user.is_kyc_passed,
            role: user.role,
        }
    }
}

/// Stored refresh token row (the token itself is only kept as a hash)
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Verification status as persisted; `NOT_SUBMITTED` is the absence of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Requested,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Requested => "REQUESTED",
            KycStatus::Approved => "APPROVED",
            KycStatus::Rejected => "REJECTED",
        }
    }

    /// Statuses that block a new submission
    pub fn is_active(&self) -> bool {
        matches!(self, KycStatus::Requested | KycStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, KycStatus::Approved | KycStatus::Rejected)
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KycStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(KycStatus::Requested),
            "APPROVED" => Ok(KycStatus::Approved),
            "REJECTED" => Ok(KycStatus::Rejected),
            other => Err(ServiceError::StorageError(format!("Unknown KYC status '{}'", other))),
        }
    }
}

/// Handle to an object held by the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    pub url: String,
    pub public_id: String,
}

/// One KYC verification attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub national_id: BlobRef,
    pub selfie: BlobRef,
    pub status: KycStatus,
    pub onfido_applicant_id: Option<String>,
    pub onfido_check_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a verification record
#[derive(Debug, Clone)]
pub struct NewVerification {
    pub user_id: Uuid,
    pub national_id: BlobRef,
    pub selfie: BlobRef,
}

/// Result of applying an oracle verdict to a record
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The record moved out of REQUESTED
    Applied { user_id: Uuid, status: KycStatus },
    /// The record was already terminal; nothing changed
    AlreadyFinal { user_id: Uuid, status: KycStatus },
    /// No record references the check id
    NotFound,
}

/// Uploaded file ready for the blob store and the oracle
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

impl Attachment {
    /// Subtype of the MIME type, e.g. `jpeg` for `image/jpeg`
    pub fn file_type(&self) -> &str {
        self.content_type
            .split('/')
            .nth(1)
            .unwrap_or(self.content_type.as_str())
    }
}
