// Axum extractors for the caller's identity and request metadata

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::auth::audit_logger::ClientInfo;
use crate::core::errors::ServiceError;
use crate::core::models::UserSummary;

/// Authenticated caller, loaded fresh from the user repository
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserSummary);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ServiceError::AuthenticationError("Missing or malformed Authorization header".to_string())
        })?;

        let user = state.credentials.authenticate(token).await?;
        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(client_info(&parts.headers))
    }
}

/// Token following `Bearer ` in the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Checks `X-Forwarded-For` first (for proxied requests), then `X-Real-IP`.
fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("X-Forwarded-For")
        .or_else(|| headers.get("X-Real-IP"))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    ClientInfo {
        ip_address,
        user_agent,
    }
}
