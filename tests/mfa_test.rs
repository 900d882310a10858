#![allow(clippy::unwrap_used, clippy::expect_used)]
//! MFA challenge path (scenario F): a TOTP-enrolled user's password grant
//! is intercepted into an `mfa_required` response; the follow-up
//! `mfa_otp` grant completes the exchange, and repeated wrong attempts
//! eventually lock the challenge out.

mod common;

use axum::http::StatusCode;
use common::{TestApp, form_request, response_json};
use totp_rs::{Algorithm, Secret, TOTP};

#[tokio::test]
async fn password_grant_challenges_mfa_then_succeeds_with_correct_otp() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("mfa-realm").await;
    app.seed_confidential_client(
        realm_id,
        "app-client",
        "app-secret",
        &["password", "mfa_otp"],
        &[],
    )
    .await;
    let user_id = app.seed_user(realm_id, "frank", "totp-protected-password").await;

    let enrollment = wardenio_kernel::mfa::enroll_totp(&app.db, user_id, "frank", "wardenio", "mfa-realm")
        .await
        .expect("failed to enroll TOTP");

    let otp = current_otp(&enrollment.secret);
    let activated = wardenio_kernel::mfa::activate_totp(&app.db, user_id, "frank", &otp)
        .await
        .expect("activate_totp failed");
    assert!(activated.is_some(), "activation should succeed with a correct, current OTP");

    let challenged = app
        .request(form_request(
            "/realms/mfa-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "password"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("username", "frank"),
                ("password", "totp-protected-password"),
                ("scope", "openid"),
            ],
        ))
        .await;
    assert_eq!(challenged.status(), StatusCode::OK);
    let challenge_body = response_json(challenged).await;
    assert_eq!(challenge_body["error"], "mfa_required");
    let mfa_token = challenge_body["mfa_token"].as_str().expect("missing mfa_token").to_string();

    let completion_otp = current_otp(&enrollment.secret);
    let completed = app
        .request(form_request(
            "/realms/mfa-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "mfa_otp"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("mfa_token", &mfa_token),
                ("otp", &completion_otp),
            ],
        ))
        .await;
    assert_eq!(completed.status(), StatusCode::CREATED);
    let completed_body = response_json(completed).await;
    assert!(completed_body["access_token"].as_str().unwrap_or_default().len() > 0);
}

#[tokio::test]
async fn sixth_wrong_otp_attempt_locks_the_challenge() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("mfa-lockout-realm").await;
    app.seed_confidential_client(
        realm_id,
        "app-client",
        "app-secret",
        &["password", "mfa_otp"],
        &[],
    )
    .await;
    let user_id = app.seed_user(realm_id, "grace", "also-totp-protected").await;

    let enrollment = wardenio_kernel::mfa::enroll_totp(&app.db, user_id, "grace", "wardenio", "mfa-lockout-realm")
        .await
        .expect("failed to enroll TOTP");
    let otp = current_otp(&enrollment.secret);
    wardenio_kernel::mfa::activate_totp(&app.db, user_id, "grace", &otp)
        .await
        .expect("activate_totp failed");

    let challenged = app
        .request(form_request(
            "/realms/mfa-lockout-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "password"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("username", "grace"),
                ("password", "also-totp-protected"),
                ("scope", "openid"),
            ],
        ))
        .await;
    let challenge_body = response_json(challenged).await;
    let mfa_token = challenge_body["mfa_token"].as_str().expect("missing mfa_token").to_string();

    // Five wrong attempts are tolerated (each just increments the
    // counter); the sixth must report `invalid_grant` via the lockout
    // branch rather than the plain "invalid otp" branch.
    for _ in 0..5 {
        let attempt = app
            .request(form_request(
                "/realms/mfa-lockout-realm/protocol/openid-connect/token",
                &[
                    ("grant_type", "mfa_otp"),
                    ("client_id", "app-client"),
                    ("client_secret", "app-secret"),
                    ("mfa_token", &mfa_token),
                    ("otp", "000000"),
                ],
            ))
            .await;
        assert_eq!(attempt.status(), StatusCode::BAD_REQUEST);
    }

    let sixth = app
        .request(form_request(
            "/realms/mfa-lockout-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "mfa_otp"),
                ("client_id", "app-client"),
                ("client_secret", "app-secret"),
                ("mfa_token", &mfa_token),
                ("otp", "000000"),
            ],
        ))
        .await;
    assert_eq!(sixth.status(), StatusCode::BAD_REQUEST);
    let sixth_body = response_json(sixth).await;
    assert_eq!(sixth_body["error"], "invalid_grant");
}

fn current_otp(secret_encoded: &str) -> String {
    let secret = Secret::Encoded(secret_encoded.to_string())
        .to_bytes()
        .expect("invalid encoded secret");
    let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, secret, None, String::new())
        .expect("failed to construct TOTP");
    totp.generate_current().expect("failed to generate OTP")
}
