// Axum web server layer

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod responses;

use crate::auth::audit_logger::AuditLogger;
use crate::auth::{CredentialService, TokenIssuer};
use crate::config::Config;
use crate::infra::{BlobStore, VerificationOracle};
use crate::kyc::KycOrchestrator;
use crate::store::{Repositories, VerificationRepository};

/// Application state containing all shared dependencies
///
/// All components are wrapped in Arc for shared ownership across async tasks.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialService>,
    pub orchestrator: Arc<KycOrchestrator>,
    pub audit_logger: Arc<AuditLogger>,
    pub verifications: Arc<dyn VerificationRepository>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire services over the given repositories and upstream clients
    pub fn new(
        config: Arc<Config>,
        repositories: Repositories,
        blob_store: Arc<dyn BlobStore>,
        oracle: Arc<dyn VerificationOracle>,
        audit_logger: Arc<AuditLogger>,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        ));

        let credentials = Arc::new(CredentialService::new(
            repositories.users.clone(),
            repositories.refresh_tokens.clone(),
            issuer,
            config.bcrypt_cost,
        ));

        let orchestrator = Arc::new(KycOrchestrator::new(
            repositories.users.clone(),
            repositories.verifications.clone(),
            blob_store,
            oracle,
            config.cloudinary_folder.clone(),
        ));

        Self {
            credentials,
            orchestrator,
            audit_logger,
            verifications: repositories.verifications,
            config,
        }
    }
}

/// Create the Axum router with all routes and middleware
///
/// Middleware stack (outermost to innermost):
/// - Request timeout (tower::timeout) with HandleErrorLayer turning it into 408
/// - Tracing (tower-http::trace)
/// - Body size limit (tower-http::limit), sized for two maximum uploads
///
/// Authentication is per handler through the `CurrentUser` extractor.
pub fn create_router(app_state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/auth/register", post(handlers::register_handler))
        .route("/auth/login", post(handlers::login_handler))
        .route("/auth/refresh-token", post(handlers::refresh_token_handler))
        .route("/auth/logout", post(handlers::logout_handler))
        .route("/auth/profile", get(handlers::profile_handler))
        .route("/kyc/verify", post(handlers::kyc_verify_handler))
        .route("/kyc/status", get(handlers::kyc_status_handler))
        .route("/kyc/webhook", post(handlers::kyc_webhook_handler))
        .route("/admin/kyc/:user_id", get(handlers::admin_kyc_records_handler))
        .route("/health", get(handlers::health_handler));

    let body_limit = app_state.config.body_size_limit_bytes;
    let timeout_secs = app_state.config.request_timeout_secs;

    // Replace axum's 2 MiB extractor default with the configured limit
    let router = router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http());

    // HandleErrorLayer must come BEFORE timeout to catch the timeout error
    let middleware_stack = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|e: BoxError| async move {
            let status = if e.is::<tower::timeout::error::Elapsed>() {
                StatusCode::REQUEST_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, e.to_string())
        }))
        .timeout(Duration::from_secs(timeout_secs))
        .into_inner();

    router.layer(middleware_stack)
}
