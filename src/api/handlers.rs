// Request handlers for API endpoints

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::responses::{
    AccessTokenResponse, ApiError, HealthResponse, MessageResponse, ProfileResponse,
    RecordListResponse, RecordResponse, StatusResponse,
};
use crate::api::AppState;
use crate::auth::audit_logger::{AuthEvent, ClientInfo};
use crate::auth::gate::{authorize, Requirement, ADMIN_ROLES};
use crate::auth::{AuthTokens, CurrentUser, Registration};
use crate::core::errors::ServiceError;
use crate::core::models::Attachment;
use crate::kyc::attachments::{resolve_content_type, SubmissionBuilder};
use crate::kyc::webhook::{verify_signature, WebhookEvent, SIGNATURE_HEADER};

/// Store ping budget for `/health`
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub fullnames: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

/// Unwrap a JSON body, turning every rejection into a 400
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ServiceError::ValidationError(format!("Invalid JSON body: {}", e.body_text())).into())
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", field)).into())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// POST /auth/register
pub async fn register_handler(
    State(app_state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthTokens>), ApiError> {
    let body = json_body(payload)?;
    let registration = Registration {
        fullnames: required(body.fullnames, "fullnames")?,
        email: required(body.email, "email")?,
        username: required(body.username, "username")?,
        password: required(body.password, "password")?,
    };

    let tokens = app_state.credentials.register(registration).await?;
    app_state
        .audit_logger
        .log_auth_event(AuthEvent::Registered, Some(tokens.user.id), &client);

    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/login
pub async fn login_handler(
    State(app_state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthTokens>, ApiError> {
    let body = json_body(payload)?;
    let email = required(body.email, "email")?;
    let password = required(body.password, "password")?;

    match app_state.credentials.login(&email, &password).await {
        Ok(tokens) => {
            app_state
                .audit_logger
                .log_auth_event(AuthEvent::LoginSuccess, Some(tokens.user.id), &client);
            Ok(Json(tokens))
        }
        Err(e) => {
            if let ServiceError::AuthenticationError(ref reason) = e {
                app_state.audit_logger.log_auth_event(
                    AuthEvent::LoginFailure {
                        reason: reason.clone(),
                    },
                    None,
                    &client,
                );
            }
            Err(e.into())
        }
    }
}

/// POST /auth/refresh-token
pub async fn refresh_token_handler(
    State(app_state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let refresh_token = required(json_body(payload)?.refresh_token, "refreshToken")?;

    match app_state.credentials.refresh(&refresh_token).await {
        Ok(issued) => Ok(Json(AccessTokenResponse {
            access_token: issued.token,
        })),
        Err(e) => {
            if let ServiceError::AuthenticationError(ref reason) = e {
                app_state.audit_logger.log_auth_event(
                    AuthEvent::RefreshFailure {
                        reason: reason.clone(),
                    },
                    None,
                    &client,
                );
            }
            Err(e.into())
        }
    }
}

/// POST /auth/logout
pub async fn logout_handler(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let refresh_token = required(json_body(payload)?.refresh_token, "refreshToken")?;

    app_state.credentials.logout(user.id, &refresh_token).await?;
    app_state
        .audit_logger
        .log_auth_event(AuthEvent::Logout, Some(user.id), &client);

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// GET /auth/profile
pub async fn profile_handler(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { user })
}

/// POST /kyc/verify
///
/// Requires a verified email. Expects multipart fields `nationalId` and `selfie`.
pub async fn kyc_verify_handler(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let request_id = request_id(&headers);
    authorize(&user, &[Requirement::EmailVerified])?;

    let mut multipart = multipart.map_err(|e| {
        ServiceError::ValidationError(format!("Expected multipart/form-data: {}", e.body_text()))
    })?;

    let mut builder = SubmissionBuilder::new(app_state.config.max_upload_bytes);
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::ValidationError(format!("Invalid multipart body: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or(name.as_str()).to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::ValidationError(format!("Failed to read {}: {}", name, e.body_text())))?;

        let content_type = resolve_content_type(declared.as_deref(), &file_name).ok_or_else(|| {
            ServiceError::ValidationError(format!("{} must be a JPEG, PNG or PDF file", name))
        })?;

        builder.add(
            &name,
            Attachment {
                file_name,
                content_type,
                bytes,
            },
        )?;
    }
    let submission = builder.finish()?;

    info!(user_id = %user.id, request_id = %request_id, "KYC submission received");

    let record = app_state
        .orchestrator
        .submit(&user, submission)
        .await
        .map_err(|e| ApiError::from_service_error_with_id(e, request_id.clone()))?;

    Ok((StatusCode::CREATED, Json(RecordResponse { record })))
}

/// GET /kyc/status
pub async fn kyc_status_handler(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(app_state.orchestrator.status(user.id).await?))
}

/// POST /kyc/webhook
///
/// The signature is checked against the raw body before anything is parsed.
pub async fn kyc_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request_id = request_id(&headers);

    if let Some(ref token) = app_state.config.onfido_webhook_token {
        let provided = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = verify_signature(token.expose_secret().as_bytes(), &body, provided) {
            warn!(request_id = %request_id, error = %e, "Webhook signature rejected");
            return Err(ApiError::from_service_error_with_id(e, request_id));
        }
    }

    let event = WebhookEvent::parse(&body)
        .map_err(|e| ApiError::from_service_error_with_id(e, request_id.clone()))?;

    let outcome = app_state
        .orchestrator
        .handle_webhook(&event)
        .await
        .map_err(|e| ApiError::from_service_error_with_id(e, request_id.clone()))?;

    debug!(request_id = %request_id, outcome = ?outcome, "Webhook processed");

    Ok(Json(MessageResponse {
        message: "Webhook received".to_string(),
    }))
}

/// GET /admin/kyc/:user_id
pub async fn admin_kyc_records_handler(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RecordListResponse>, ApiError> {
    authorize(&user, &[Requirement::RoleIn(ADMIN_ROLES)])?;

    let records = app_state.orchestrator.records_for_user(user_id).await?;
    info!(admin_id = %user.id, user_id = %user_id, count = records.len(), "Admin listed KYC records");

    Ok(Json(RecordListResponse { records }))
}

/// GET /health
///
/// Always 200 while the process is up; `store` reports connectivity.
pub async fn health_handler(State(app_state): State<AppState>) -> Json<HealthResponse> {
    let store = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, app_state.verifications.ping()).await {
        Ok(Ok(())) => "connected".to_string(),
        Ok(Err(e)) => {
            warn!(error = %e, "Store ping failed");
            "disconnected".to_string()
        }
        Err(_) => {
            debug!("Store ping timed out in health check");
            "slow: timeout".to_string()
        }
    };

    let status = if store == "connected" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        store,
    })
}
