// Security event logging

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Credential lifecycle event
#[derive(Debug, Clone)]
pub enum AuthEvent {
    Registered,
    LoginSuccess,
    LoginFailure { reason: String },
    RefreshFailure { reason: String },
    Logout,
}

impl AuthEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::Registered => "REGISTERED",
            AuthEvent::LoginSuccess => "LOGIN_SUCCESS",
            AuthEvent::LoginFailure { .. } => "LOGIN_FAILURE",
            AuthEvent::RefreshFailure { .. } => "REFRESH_FAILURE",
            AuthEvent::Logout => "LOGOUT",
        }
    }
}

/// Request metadata recorded alongside an event
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit logger for security events
pub struct AuditLogger {
    db_pool: Option<PgPool>,
}

impl AuditLogger {
    /// Create a new audit logger
    ///
    /// If `db_pool` is `None`, only structured logging will be used (no database persistence).
    pub fn new(db_pool: Option<PgPool>) -> Self {
        Self { db_pool }
    }

    /// Log an authentication event
    ///
    /// Fire-and-forget: spawns a task so the request never waits on the insert.
    pub fn log_auth_event(&self, event: AuthEvent, user_id: Option<Uuid>, client: &ClientInfo) {
        let db_pool = self.db_pool.clone();
        let ip = client.ip_address.clone();
        let ua = client.user_agent.clone();

        tokio::spawn(async move {
            match event {
                AuthEvent::LoginFailure { ref reason } | AuthEvent::RefreshFailure { ref reason } => {
                    warn!(
                        event = event.event_type(),
                        user_id = ?user_id,
                        ip_address = ?ip,
                        user_agent = ?ua,
                        reason = %reason,
                        "Authentication failed"
                    );
                }
                _ => {
                    info!(
                        event = event.event_type(),
                        user_id = ?user_id,
                        ip_address = ?ip,
                        user_agent = ?ua,
                        "Authentication event"
                    );
                }
            }

            if let Some(pool) = db_pool {
                // INET column: sqlx binds None as NULL and Postgres parses the string
                if let Err(e) = sqlx::query(
                    "INSERT INTO auth_audit_log (user_id, event_type, ip_address, user_agent, created_at)
                     VALUES ($1, $2, $3::inet, $4, NOW())",
                )
                .bind(user_id)
                .bind(event.event_type())
                .bind(ip.as_deref())
                .bind(&ua)
                .execute(&pool)
                .await
                {
                    warn!(error = %e, "Failed to write audit log to database");
                }
            }
        });
    }
}
