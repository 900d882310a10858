#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end grant-pipeline scenarios, driven through the real HTTP
//! surface against a live Postgres + Redis.
//!
//! ## Prerequisites
//!
//! ```bash
//! docker-compose up -d
//! ```
//!
//! ## Running
//!
//! ```bash
//! cargo test --test token_grants_test
//! ```

mod common;

use axum::http::StatusCode;
use common::{TestApp, form_request, response_json};

#[tokio::test]
async fn client_credentials_grant_returns_access_token_only() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("client-creds-realm").await;
    app.seed_confidential_client(
        realm_id,
        "svc-client",
        "svc-secret",
        &["client_credentials"],
        &[],
    )
    .await;

    let response = app
        .request(form_request(
            "/realms/client-creds-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "svc-client"),
                ("client_secret", "svc-secret"),
                ("scope", "openid"),
            ],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert!(body["access_token"].as_str().unwrap_or_default().len() > 0);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "openid");
    assert!(body.get("refresh_token").is_none());
}

#[tokio::test]
async fn password_grant_with_openid_scope_returns_id_token_with_matching_at_hash() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("password-realm").await;
    app.seed_confidential_client(
        realm_id,
        "app-client",
        "app-secret",
        &["password", "refresh_token"],
        &[],
    )
    .await;
    app.seed_user(realm_id, "alice", "correct horse battery staple").await;

    let response = app
        .request(form_request(
            "/realms/password-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "password"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("username", "alice"),
                ("password", "correct horse battery staple"),
                ("scope", "openid"),
            ],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let access_token = body["access_token"].as_str().expect("missing access_token");
    let refresh_token = body["refresh_token"].as_str().expect("missing refresh_token");
    let id_token = body["id_token"].as_str().expect("missing id_token");
    assert!(!access_token.is_empty());
    assert!(!refresh_token.is_empty());

    let id_claims: serde_json::Value = {
        let payload = id_token.split('.').nth(1).expect("malformed id_token");
        let decoded = base64_url_decode(payload);
        serde_json::from_slice(&decoded).expect("id_token payload was not JSON")
    };
    let at_hash = id_claims["at_hash"].as_str().expect("id_token missing at_hash");
    assert_eq!(at_hash, wardenio_kernel::jwt::compute_at_hash(access_token));
}

#[tokio::test]
async fn refresh_rotation_poisons_session_on_reuse() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("refresh-realm").await;
    app.seed_confidential_client(
        realm_id,
        "app-client",
        "app-secret",
        &["password", "refresh_token"],
        &[],
    )
    .await;
    app.seed_user(realm_id, "bob", "hunter2-hunter2").await;

    let first = app
        .request(form_request(
            "/realms/refresh-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "password"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("username", "bob"),
                ("password", "hunter2-hunter2"),
                ("scope", "openid"),
            ],
        ))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = response_json(first).await;
    let r1 = first_body["refresh_token"].as_str().expect("missing refresh_token").to_string();

    let rotated = app
        .request(form_request(
            "/realms/refresh-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("refresh_token", &r1),
            ],
        ))
        .await;
    assert_eq!(rotated.status(), StatusCode::CREATED);
    let rotated_body = response_json(rotated).await;
    let r2 = rotated_body["refresh_token"].as_str().expect("missing refresh_token").to_string();
    assert_ne!(r1, r2);

    // Replaying R1 (already rotated away) must fail.
    let replay = app
        .request(form_request(
            "/realms/refresh-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("refresh_token", &r1),
            ],
        ))
        .await;
    assert!(replay.status() == StatusCode::BAD_REQUEST || replay.status() == StatusCode::UNAUTHORIZED);

    // R2 is now poisoned too, since R1's reuse revoked the whole session.
    let after_poison = app
        .request(form_request(
            "/realms/refresh-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("refresh_token", &r2),
            ],
        ))
        .await;
    assert!(
        after_poison.status() == StatusCode::BAD_REQUEST
            || after_poison.status() == StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn revoked_token_introspects_as_inactive() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("introspect-realm").await;
    app.seed_confidential_client(
        realm_id,
        "app-client",
        "app-secret",
        &["password"],
        &[],
    )
    .await;
    app.seed_user(realm_id, "carol", "another-long-password").await;

    let issued = app
        .request(form_request(
            "/realms/introspect-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "password"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("username", "carol"),
                ("password", "another-long-password"),
                ("scope", "openid"),
            ],
        ))
        .await;
    let issued_body = response_json(issued).await;
    let access_token = issued_body["access_token"].as_str().expect("missing access_token").to_string();

    let revoke = app
        .request(form_request(
            "/realms/introspect-realm/protocol/openid-connect/revoke",
            &[("token", &access_token)],
        ))
        .await;
    assert_eq!(revoke.status(), StatusCode::OK);

    let introspect = app
        .request(form_request(
            "/realms/introspect-realm/protocol/openid-connect/token/introspect",
            &[("token", &access_token)],
        ))
        .await;
    assert_eq!(introspect.status(), StatusCode::OK);
    let introspect_body = response_json(introspect).await;
    assert_eq!(introspect_body["active"], false);
}

#[tokio::test]
async fn unknown_client_is_rejected_before_credential_check() {
    let app = TestApp::new().await;
    app.seed_realm("empty-realm").await;

    let response = app
        .request(form_request(
            "/realms/empty-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "does-not-exist"),
                ("client_secret", "whatever"),
            ],
        ))
        .await;

    assert!(response.status().is_client_error());
}

fn base64_url_decode(input: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input)
        .expect("invalid base64url segment")
}
