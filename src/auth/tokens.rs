// JWT issuance and verification (HS256, shared secret)

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::{Role, User};

/// Clock skew tolerated when checking `exp`
const LEEWAY_SECS: u64 = 5;

/// Which half of the pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Signed payload shared by access and refresh tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    /// Unique per issuance so two tokens minted in the same second never collide
    pub jti: Uuid,
}

/// Token string plus its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and checks tokens with one process-wide secret
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &Secret<String>, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        let bytes = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
            access_ttl_secs: access_ttl_secs as i64,
            refresh_ttl_secs: refresh_ttl_secs as i64,
        }
    }

    pub fn issue_access(&self, user: &User) -> ServiceResult<IssuedToken> {
        self.issue(user, TokenType::Access, self.access_ttl_secs)
    }

    pub fn issue_refresh(&self, user: &User) -> ServiceResult<IssuedToken> {
        self.issue(user, TokenType::Refresh, self.refresh_ttl_secs)
    }

    fn issue(&self, user: &User, token_type: TokenType, ttl_secs: i64) -> ServiceResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_secs);
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            token_type,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = self.sign(&claims)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Sign arbitrary claims (exposed for tests that need crafted payloads)
    pub fn sign(&self, claims: &Claims) -> ServiceResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("JWT encode: {}", e)))
    }

    pub fn verify_access(&self, token: &str) -> ServiceResult<Claims> {
        self.verify(token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> ServiceResult<Claims> {
        self.verify(token, TokenType::Refresh)
    }

    /// Check signature, expiry and the `type` claim
    fn verify(&self, token: &str, expected: TokenType) -> ServiceResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ServiceError::AuthenticationError(format!("JWT rejected: {}", e)))?;

        if data.claims.token_type != expected {
            return Err(ServiceError::AuthenticationError(format!(
                "Expected {:?} token, got {:?}",
                expected, data.claims.token_type
            )));
        }

        Ok(data.claims)
    }
}
