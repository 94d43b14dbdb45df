// Main entry point for the KYC gateway

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use kyc_gateway::api::{create_router, AppState};
use kyc_gateway::auth::audit_logger::AuditLogger;
use kyc_gateway::config::Config;
use kyc_gateway::infra::{BlobStore, CloudinaryBlobStore, OnfidoClient, VerificationOracle};
use kyc_gateway::store::{PgStore, Repositories};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Initialize tracing subscriber; must only happen once
    init_tracing(&config)?;

    info!("Starting KYC gateway");
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        onfido_base_url = %config.onfido_base_url,
        "Configuration loaded"
    );

    // 3. Persistence: Postgres when configured, otherwise in-memory
    let (repositories, db_pool) = match config.database_url {
        Some(ref database_url) => {
            let store = PgStore::connect(database_url, config.database_max_connections)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to connect to database");
                    e
                })?;
            let pool = store.pool().clone();
            info!("Database pool initialized and migrations applied");
            (Repositories::postgres(store), Some(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on restart)");
            (Repositories::in_memory(), None)
        }
    };

    // 4. Upstream clients
    let blob_store: Arc<dyn BlobStore> = Arc::new(CloudinaryBlobStore::new(&config)?);
    let oracle: Arc<dyn VerificationOracle> = Arc::new(OnfidoClient::new(&config)?);
    info!("Upstream clients initialized");

    if config.onfido_webhook_token.is_none() {
        warn!("ONFIDO_WEBHOOK_TOKEN not set; webhook signatures will not be verified");
    }

    // 5. Audit logger
    let audit_logger = Arc::new(AuditLogger::new(db_pool));

    // 6. Services and router
    let config = Arc::new(config);
    let app_state = AppState::new(config.clone(), repositories, blob_store, oracle, audit_logger);

    let purge_task = app_state
        .credentials
        .clone()
        .spawn_purge_task(Duration::from_secs(config.token_purge_interval_secs));

    let router = create_router(&app_state).with_state(app_state);
    info!("Router created");

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %addr, "Server listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    purge_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber based on configuration
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let level = parse_log_level(&config.log_level).map_err(anyhow::Error::msg)?;

    // RUST_LOG wins over LOG_LEVEL when set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<tracing::Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        _ => Err(format!("Invalid log level: {}", level)),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
