#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Authorization-code + PKCE exchange (scenario D): a code is single-use
//! and its `code_challenge` accepts exactly the verifier it was minted
//! with.

mod common;

use axum::http::StatusCode;
use common::{TestApp, form_request, response_json};
use wardenio_kernel::models::authorization_code::AuthorizationCode;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

#[tokio::test]
async fn pkce_code_accepts_its_own_verifier_once_and_rejects_replay() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("pkce-realm").await;
    let client_id = app
        .seed_public_client(
            realm_id,
            "spa-client",
            &["authorization_code"],
            &["https://app.example/cb"],
        )
        .await;
    let user_id = app.seed_user(realm_id, "dana", "irrelevant-for-this-flow").await;

    let (code, _record) = AuthorizationCode::issue(
        &app.db,
        client_id,
        user_id,
        "https://app.example/cb",
        "openid",
        None,
        Some(CHALLENGE),
        Some("S256"),
    )
    .await
    .expect("failed to seed authorization code");

    let exchanged = app
        .request(form_request(
            "/realms/pkce-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "spa-client"),
                ("code", &code),
                ("redirect_uri", "https://app.example/cb"),
                ("code_verifier", VERIFIER),
            ],
        ))
        .await;
    assert_eq!(exchanged.status(), StatusCode::CREATED);
    let body = response_json(exchanged).await;
    assert!(body["access_token"].as_str().unwrap_or_default().len() > 0);

    // The code is now consumed (atomic `used` CAS); any subsequent
    // exchange attempt, even with the correct verifier, fails.
    let replay = app
        .request(form_request(
            "/realms/pkce-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "spa-client"),
                ("code", &code),
                ("redirect_uri", "https://app.example/cb"),
                ("code_verifier", VERIFIER),
            ],
        ))
        .await;
    assert!(replay.status().is_client_error());
}

#[tokio::test]
async fn pkce_code_rejects_a_foreign_verifier_and_is_consumed_by_the_attempt() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("pkce-reject-realm").await;
    let client_id = app
        .seed_public_client(
            realm_id,
            "spa-client",
            &["authorization_code"],
            &["https://app.example/cb"],
        )
        .await;
    let user_id = app.seed_user(realm_id, "erin", "irrelevant-for-this-flow").await;

    let (code, _record) = AuthorizationCode::issue(
        &app.db,
        client_id,
        user_id,
        "https://app.example/cb",
        "openid",
        None,
        Some(CHALLENGE),
        Some("S256"),
    )
    .await
    .expect("failed to seed authorization code");

    let wrong_verifier = app
        .request(form_request(
            "/realms/pkce-reject-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "spa-client"),
                ("code", &code),
                ("redirect_uri", "https://app.example/cb"),
                ("code_verifier", "not-the-right-verifier-at-all-00000000000"),
            ],
        ))
        .await;
    assert!(wrong_verifier.status().is_client_error());

    // Consumption happens before the PKCE check (the code is single-use
    // by construction); the correct verifier cannot rescue it afterward.
    let retry_with_correct_verifier = app
        .request(form_request(
            "/realms/pkce-reject-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "spa-client"),
                ("code", &code),
                ("redirect_uri", "https://app.example/cb"),
                ("code_verifier", VERIFIER),
            ],
        ))
        .await;
    assert!(retry_with_correct_verifier.status().is_client_error());
}
