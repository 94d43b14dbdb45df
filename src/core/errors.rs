// Domain error types - secure error handling with no information disclosure

use thiserror::Error;

/// Machine-readable code for a missing email verification
pub const EMAIL_VERIFICATION_REQUIRED: &str = "EMAIL_VERIFICATION_REQUIRED";
/// Machine-readable code for a missing KYC approval
pub const KYC_VERIFICATION_REQUIRED: &str = "KYC_VERIFICATION_REQUIRED";
/// Machine-readable code for a role mismatch
pub const INSUFFICIENT_PERMISSIONS: &str = "INSUFFICIENT_PERMISSIONS";

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or missing input (HTTP 400)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Bad, missing or expired credentials (HTTP 401)
    ///
    /// The payload is for server-side logs only; clients always see the generic message.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Authenticated but not authorized (HTTP 403)
    #[error("Forbidden ({code}): {message}")]
    ForbiddenError { code: &'static str, message: String },

    /// State already satisfies a uniqueness precondition (HTTP 400)
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Blob store or verification oracle unreachable or erroring (HTTP 502)
    ///
    /// `status` is the upstream HTTP status when the upstream answered at all.
    #[error("Upstream error from {service}: {detail}")]
    UpstreamError {
        service: String,
        detail: String,
        status: Option<u16>,
    },

    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Persistence failure (HTTP 500)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Anything else (HTTP 500)
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn upstream(service: &str, detail: impl Into<String>) -> Self {
        ServiceError::UpstreamError {
            service: service.to_string(),
            detail: detail.into(),
            status: None,
        }
    }

    /// Upstream answered with a non-2xx status
    pub fn upstream_status(service: &str, status: u16, detail: impl Into<String>) -> Self {
        ServiceError::UpstreamError {
            service: service.to_string(),
            detail: detail.into(),
            status: Some(status),
        }
    }

    /// Transport failures, timeouts, malformed bodies and 5xx; never a 4xx
    pub fn is_upstream_fault(&self) -> bool {
        match self {
            ServiceError::UpstreamError { status, .. } => status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::ForbiddenError {
            code,
            message: message.into(),
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::ValidationError(_) => 400,
            ServiceError::AuthenticationError(_) => 401,
            ServiceError::ForbiddenError { .. } => 403,
            ServiceError::ConflictError(_) => 400,
            ServiceError::UpstreamError { .. } => 502,
            ServiceError::NotFoundError(_) => 404,
            ServiceError::StorageError(_) => 500,
            ServiceError::ConfigurationError(_) => 500,
            ServiceError::InternalError(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::ValidationError(msg) => msg.clone(),
            ServiceError::AuthenticationError(_) => "Invalid or expired credentials".to_string(),
            ServiceError::ForbiddenError { message, .. } => message.clone(),
            ServiceError::ConflictError(msg) => msg.clone(),
            ServiceError::UpstreamError { .. } => "Upstream service unavailable".to_string(),
            ServiceError::NotFoundError(msg) => msg.clone(),
            ServiceError::StorageError(_) => "Internal error".to_string(),
            ServiceError::ConfigurationError(_) => "Internal error".to_string(),
            ServiceError::InternalError(_) => "Internal error".to_string(),
        }
    }

    /// Machine-readable code, only set for authorization failures
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ServiceError::ForbiddenError { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the error is a server-side fault that should be logged at error level
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return ServiceError::ConflictError(conflict_message(db_err.constraint()));
            }
        }
        ServiceError::StorageError(err.to_string())
    }
}

fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if c.contains("email") || c.contains("username") => {
            "Email or username already in use".to_string()
        }
        Some(c) if c.contains("kyc_docs") => {
            "KYC verification is already in progress or approved".to_string()
        }
        _ => "Resource already exists".to_string(),
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
