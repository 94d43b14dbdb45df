// Response types for API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::core::errors::ServiceError;
use crate::core::models::{UserSummary, VerificationRecord};
use crate::kyc::KycStatusView;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Fresh access token from `/auth/refresh-token`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub record: VerificationRecord,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<VerificationRecord>,
}

pub type StatusResponse = KycStatusView;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

/// API error type that converts domain errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
    pub request_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            code: None,
            request_id: None,
        }
    }

    /// Map a domain error, logging the internal detail the client never sees
    pub fn from_service_error(err: ServiceError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if matches!(err, ServiceError::UpstreamError { .. }) {
            warn!(error = %err, "Upstream failure");
        } else if err.is_internal() {
            error!(error = %err, "Request failed");
        } else {
            debug!(error = %err, "Request rejected");
        }

        Self {
            status,
            message: err.user_message(),
            code: err.code(),
            request_id: None,
        }
    }

    /// Create from ServiceError with request ID
    pub fn from_service_error_with_id(err: ServiceError, request_id: String) -> Self {
        Self {
            request_id: Some(request_id),
            ..Self::from_service_error(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code,
            request_id: self.request_id,
        });
        (self.status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::from_service_error(err)
    }
}
