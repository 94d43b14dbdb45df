// HTTP surface exercised through the router

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use kyc_gateway::api::create_router;
use kyc_gateway::config::Config;
use kyc_gateway::core::models::Role;
use kyc_gateway::kyc::webhook::{sign, SIGNATURE_HEADER};

use super::common::{config_with_webhook_token, MockBlobStore, MockOracle, TestApp, TEST_PASSWORD};

const BOUNDARY: &str = "kyc-test-boundary";

fn router(app: &TestApp) -> Router {
    create_router(&app.state).with_state(app.state.clone())
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(app).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// (field, file name, content type)
fn multipart_body(parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, content_type) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(b"fake-file-bytes");
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn verify_request(bearer: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/kyc/verify")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

const BOTH_FILES: &[(&str, &str, &str)] = &[
    ("nationalId", "id.pdf", "application/pdf"),
    ("selfie", "me.jpg", "image/jpeg"),
];

fn webhook_body(check_id: &str) -> String {
    json!({
        "payload": {
            "resource_type": "check",
            "action": "check.completed",
            "object": {"id": check_id, "status": "complete"}
        }
    })
    .to_string()
}

fn webhook_request(body: String, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/kyc/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_full_kyc_flow() {
    let app = TestApp::new();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({
                "fullnames": "Ada Lovelace",
                "email": "Ada@Example.com",
                "username": "ada",
                "password": TEST_PASSWORD
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["isKycPassed"], false);
    let user_id: uuid::Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();

    app.store.update_user_flags(user_id, true, Role::User).await.unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": TEST_PASSWORD}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["accessToken"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["isEmailVerified"], true);

    let (status, body) = send(&app, verify_request(&access, BOTH_FILES)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["status"], "REQUESTED");
    let check_id = body["record"]["onfidoCheckId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/kyc/status", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REQUESTED");
    assert_eq!(body["onfidoStatus"], "in_progress");

    app.oracle.set_check("complete", Some("clear"));
    let (status, body) = send(&app, webhook_request(webhook_body(&check_id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Webhook received");

    let (_, body) = send(&app, get("/kyc/status", Some(&access))).await;
    assert_eq!(body["status"], "APPROVED");

    let (_, body) = send(&app, get("/auth/profile", Some(&access))).await;
    assert_eq!(body["user"]["isKycPassed"], true);

    // Approved users cannot start another verification
    let (status, _) = send(&app, verify_request(&access, BOTH_FILES)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_missing_field_is_400() {
    let app = TestApp::new();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({"email": "ada@example.com", "username": "ada", "password": TEST_PASSWORD}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fullnames"));
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_login_is_401_with_generic_message() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "wrong-password"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired credentials");
}

#[tokio::test]
async fn test_refresh_and_logout() {
    let app = TestApp::new();
    let tokens = app.register("ada@example.com", "ada").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/auth/refresh-token", json!({}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("refreshToken"));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/refresh-token",
            json!({"refreshToken": tokens.refresh_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().is_some());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/logout",
            json!({"refreshToken": tokens.refresh_token}),
            Some(&tokens.access_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/refresh-token",
            json!({"refreshToken": tokens.refresh_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_bearer() {
    let app = TestApp::new();

    for uri in ["/auth/profile", "/kyc/status"] {
        let (status, _) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let (status, _) = send(&app, get("/auth/profile", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_requires_verified_email() {
    let app = TestApp::new();
    let tokens = app.register("ada@example.com", "ada").await;

    let (status, body) = send(&app, verify_request(&tokens.access_token, BOTH_FILES)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "EMAIL_VERIFICATION_REQUIRED");
    assert!(app.blobs.live().is_empty());
}

#[tokio::test]
async fn test_verify_rejects_bad_files() {
    let app = TestApp::new();
    let tokens = app.verified_user("ada@example.com", "ada").await;

    let missing_selfie = &[("nationalId", "id.pdf", "application/pdf")];
    let (status, _) = send(&app, verify_request(&tokens.access_token, missing_selfie)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong_type = &[
        ("nationalId", "id.gif", "image/gif"),
        ("selfie", "me.jpg", "image/jpeg"),
    ];
    let (status, _) = send(&app, verify_request(&tokens.access_token, wrong_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.blobs.live().is_empty());
    assert_eq!(app.store.verification_count(tokens.user.id).await, 0);
}

#[tokio::test]
async fn test_verify_upstream_failure_is_502() {
    let app = TestApp::with(
        MockBlobStore::failing_on("selfies"),
        MockOracle::default(),
        Config::test_config(),
    );
    let tokens = app.verified_user("ada@example.com", "ada").await;

    let (status, body) = send(&app, verify_request(&tokens.access_token, BOTH_FILES)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_webhook_signature_enforced_when_configured() {
    let app = TestApp::with(
        MockBlobStore::default(),
        MockOracle::default(),
        config_with_webhook_token("whsec"),
    );
    let body = webhook_body("chk-0");

    let (status, _) = send(&app, webhook_request(body.clone(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, webhook_request(body.clone(), Some("deadbeef"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signature = sign(b"whsec", body.as_bytes()).unwrap();
    let (status, _) = send(&app, webhook_request(body, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_malformed_payload_is_400() {
    let app = TestApp::new();
    let (status, _) = send(&app, webhook_request("[]".to_string(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_route_requires_admin_role() {
    let app = TestApp::new();
    let user = app.verified_user("ada@example.com", "ada").await;
    let admin = app
        .user_with_role("root@example.com", "root", Role::SuperAdmin)
        .await;
    let uri = format!("/admin/kyc/{}", user.user.id);

    let (status, body) = send(&app, get(&uri, Some(&user.access_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");

    let (status, body) = send(&app, get(&uri, Some(&admin.access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().unwrap().len(), 0);

    let missing = format!("/admin/kyc/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app, get(&missing, Some(&admin.access_token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}
