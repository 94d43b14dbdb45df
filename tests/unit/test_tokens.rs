// Token issuance, verification and hashing

use chrono::Utc;
use kyc_gateway::auth::token_hash::{RefreshToken, TokenHash};
use kyc_gateway::auth::tokens::{Claims, TokenIssuer, TokenType};
use kyc_gateway::core::errors::ServiceError;
use kyc_gateway::core::models::{Role, User};
use secrecy::Secret;
use uuid::Uuid;

fn issuer() -> TokenIssuer {
    TokenIssuer::new(
        &Secret::new("integration-secret-integration-secret".to_string()),
        3600,
        7 * 24 * 3600,
    )
}

fn user(role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        email: "linus@example.com".to_string(),
        username: "linus".to_string(),
        fullnames: "Linus Torvalds".to_string(),
        password_hash: "$2b$04$placeholder".to_string(),
        is_email_verified: false,
        is_kyc_passed: false,
        role,
        created_at: Utc::now(),
    }
}

#[test]
fn test_refresh_token_lifetime() {
    let issuer = issuer();
    let issued = issuer.issue_refresh(&user(Role::User)).unwrap();
    let claims = issuer.verify_refresh(&issued.token).unwrap();

    assert_eq!(claims.token_type, TokenType::Refresh);
    assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    assert_eq!(claims.exp, issued.expires_at.timestamp());
}

#[test]
fn test_role_is_carried() {
    let issuer = issuer();
    let issued = issuer.issue_access(&user(Role::SuperAdmin)).unwrap();
    assert_eq!(issuer.verify_access(&issued.token).unwrap().role, Role::SuperAdmin);
}

#[test]
fn test_missing_type_claim_rejected() {
    let issuer = issuer();
    let now = Utc::now().timestamp();

    // Sign a payload with the right secret but without `type`
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    let payload = serde_json::json!({
        "sub": Uuid::new_v4(),
        "email": "x@example.com",
        "role": "USER",
        "iat": now,
        "exp": now + 600,
        "jti": Uuid::new_v4(),
    });
    let key = jsonwebtoken::EncodingKey::from_secret(b"integration-secret-integration-secret");
    let token = jsonwebtoken::encode(&header, &payload, &key).unwrap();

    assert!(matches!(
        issuer.verify_access(&token),
        Err(ServiceError::AuthenticationError(_))
    ));
}

#[test]
fn test_tampered_claims_rejected() {
    let issuer = issuer();
    let u = user(Role::User);
    let now = Utc::now().timestamp();
    let token = issuer
        .sign(&Claims {
            sub: u.id,
            email: u.email.clone(),
            role: Role::User,
            token_type: TokenType::Access,
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4(),
        })
        .unwrap();

    // Swap the payload segment for one claiming a different role
    let forged = issuer
        .sign(&Claims {
            sub: u.id,
            email: u.email,
            role: Role::SuperAdmin,
            token_type: TokenType::Access,
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4(),
        })
        .unwrap();
    let mut parts: Vec<&str> = token.split('.').collect();
    let forged_payload = forged.split('.').nth(1).unwrap();
    parts[1] = forged_payload;
    let spliced = parts.join(".");

    assert!(issuer.verify_access(&spliced).is_err());
}

#[test]
fn test_refresh_token_hash_matches_stored_form() {
    let issued = issuer().issue_refresh(&user(Role::User)).unwrap();
    let stored = TokenHash::from_token(&issued.token);
    assert_eq!(RefreshToken::new(&issued.token).hash(), stored);
    assert!(!stored.as_str().contains(&issued.token));
}
