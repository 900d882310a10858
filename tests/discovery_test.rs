#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Health/readiness and the OIDC discovery document + JWKS.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{TestApp, response_json};

#[tokio::test]
async fn healthz_and_readyz_report_ok_against_live_backends() {
    let app = TestApp::new().await;

    let health = app.request(Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = app.request(Request::get("/readyz").body(Body::empty()).unwrap()).await;
    assert_eq!(ready.status(), StatusCode::OK);
    let body = response_json(ready).await;
    assert_eq!(body["postgres"], true);
    assert_eq!(body["redis"], true);
}

#[tokio::test]
async fn discovery_document_advertises_the_realm_issuer() {
    let app = TestApp::new().await;
    app.seed_realm("discovery-realm").await;

    let response = app
        .request(
            Request::get("/realms/discovery-realm/.well-known/openid-configuration")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let issuer = body["issuer"].as_str().expect("missing issuer");
    assert!(issuer.ends_with("/realms/discovery-realm"));
    assert_eq!(body["token_endpoint"], format!("{issuer}/protocol/openid-connect/token"));
    assert_eq!(body["code_challenge_methods_supported"][0], "S256");
}

#[tokio::test]
async fn certs_endpoint_exposes_the_key_provisioned_by_the_first_token_issuance() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("jwks-realm").await;
    app.seed_confidential_client(realm_id, "probe-client", "probe-secret", &["client_credentials"], &[])
        .await;

    // A realm has no signing key until something requests one; issuing a
    // token is what triggers keystore::active_key's lazy generation.
    let issued = app
        .request(common::form_request(
            "/realms/jwks-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "probe-client"),
                ("client_secret", "probe-secret"),
            ],
        ))
        .await;
    assert_eq!(issued.status(), StatusCode::CREATED);

    let response = app
        .request(
            Request::get("/realms/jwks-realm/protocol/openid-connect/certs")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let keys = body["keys"].as_array().expect("keys was not an array");
    assert_eq!(keys.len(), 1, "first call should lazily generate exactly one active key");
    assert_eq!(keys[0]["kty"], "RSA");
}

#[tokio::test]
async fn disabled_realm_is_not_found() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("disabled-realm").await;
    sqlx::query("UPDATE realms SET enabled = false WHERE id = $1")
        .bind(realm_id)
        .execute(&app.db)
        .await
        .expect("failed to disable realm");

    let response = app
        .request(
            Request::get("/realms/disabled-realm/protocol/openid-connect/certs")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
