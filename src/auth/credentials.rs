// Credential service: registration, login and the token lifecycle

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::auth::token_hash::RefreshToken;
use crate::auth::tokens::{IssuedToken, TokenIssuer};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{NewUser, RefreshTokenRecord, User, UserSummary};
use crate::store::{RefreshTokenRepository, UserRepository};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;

/// Verified against when the email is unknown, so both login failures cost one bcrypt check
const TIMING_DUMMY_PASSWORD: &str = "timing-equalizer-password";

/// Registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub fullnames: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Token pair returned by register and login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

pub struct CredentialService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    issuer: Arc<TokenIssuer>,
    bcrypt_cost: u32,
    dummy_hash: OnceCell<String>,
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        issuer: Arc<TokenIssuer>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            issuer,
            bcrypt_cost,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Create an account and log it in
    pub async fn register(&self, input: Registration) -> ServiceResult<AuthTokens> {
        let input = normalize(input);
        validate_registration(&input)?;

        if self
            .users
            .exists_by_email_or_username(&input.email, &input.username)
            .await?
        {
            return Err(ServiceError::ConflictError(
                "Email or username already in use".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password, self.bcrypt_cost).await?;

        // The unique constraints still catch a concurrent registration that passed the check above
        let user = self
            .users
            .create(NewUser {
                email: input.email,
                username: input.username,
                fullnames: input.fullnames,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "User registered");
        self.issue_pair(&user).await
    }

    /// Exchange email and password for a token pair
    ///
    /// Unknown email and wrong password produce the same error after the same amount of work.
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<AuthTokens> {
        let email = email.trim().to_lowercase();
        let user = self.users.find_by_email(&email).await?;

        let matched = match &user {
            Some(u) => verify_password(password, &u.password_hash).await?,
            None => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| hash_password(TIMING_DUMMY_PASSWORD, self.bcrypt_cost))
                    .await?;
                verify_password(password, dummy).await?;
                false
            }
        };

        match user {
            Some(user) if matched => self.issue_pair(&user).await,
            Some(user) => Err(ServiceError::AuthenticationError(format!(
                "Password mismatch for user {}",
                user.id
            ))),
            None => Err(ServiceError::AuthenticationError("Unknown email".to_string())),
        }
    }

    /// Mint a new access token from a live refresh token
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<IssuedToken> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let token_hash = RefreshToken::new(refresh_token).hash();

        self.refresh_tokens
            .find_valid(token_hash.as_str(), claims.sub, Utc::now())
            .await?
            .ok_or_else(|| {
                ServiceError::AuthenticationError("Refresh token revoked or never issued".to_string())
            })?;

        let user = self.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            ServiceError::AuthenticationError("Refresh token owner no longer exists".to_string())
        })?;

        debug!(user_id = %user.id, "Access token refreshed");
        self.issuer.issue_access(&user)
    }

    /// Revoke a refresh token belonging to `user_id`; unknown tokens are a no-op
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> ServiceResult<()> {
        let token_hash = RefreshToken::new(refresh_token).hash();
        let removed = self
            .refresh_tokens
            .delete(token_hash.as_str(), user_id)
            .await?;

        debug!(user_id = %user_id, removed, "Logout");
        Ok(())
    }

    /// Resolve an access token to a fresh snapshot of its user
    pub async fn authenticate(&self, access_token: &str) -> ServiceResult<UserSummary> {
        let claims = self.issuer.verify_access(access_token)?;
        let user = self.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            ServiceError::AuthenticationError("Token subject no longer exists".to_string())
        })?;
        Ok(UserSummary::from(&user))
    }

    /// Delete refresh tokens past their expiry
    pub async fn purge_expired(&self) -> ServiceResult<u64> {
        self.refresh_tokens.purge_expired(Utc::now()).await
    }

    /// Run `purge_expired` every `every`; abort the handle to stop it
    pub fn spawn_purge_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Purged expired refresh tokens"),
                    Err(e) => warn!(error = %e, "Refresh token purge failed"),
                }
            }
        })
    }

    async fn issue_pair(&self, user: &User) -> ServiceResult<AuthTokens> {
        let access = self.issuer.issue_access(user)?;
        let refresh = self.issuer.issue_refresh(user)?;

        self.refresh_tokens
            .insert(RefreshTokenRecord {
                token_hash: RefreshToken::new(&refresh.token).hash().into_string(),
                user_id: user.id,
                expires_at: refresh.expires_at,
            })
            .await?;

        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            user: UserSummary::from(user),
        })
    }
}

fn normalize(input: Registration) -> Registration {
    Registration {
        fullnames: input.fullnames.trim().to_string(),
        email: input.email.trim().to_lowercase(),
        username: input.username.trim().to_string(),
        password: input.password,
    }
}

fn validate_registration(input: &Registration) -> ServiceResult<()> {
    if input.fullnames.is_empty() {
        return Err(ServiceError::ValidationError("Full names are required".to_string()));
    }

    validate_email(&input.email)?;
    validate_username(&input.username)?;
    validate_password(&input.password)
}

fn validate_email(email: &str) -> ServiceResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };

    if !valid {
        return Err(ServiceError::ValidationError("Invalid email address".to_string()));
    }
    Ok(())
}

fn validate_username(username: &str) -> ServiceResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ServiceError::ValidationError(format!(
            "Username must be {} to {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ServiceError::ValidationError(
            "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
        ));
    }

    Ok(())
}
