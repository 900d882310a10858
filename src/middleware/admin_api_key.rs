//! `x-admin-api-key` gate for the admin surface (§6 "Admin REST").
//!
//! Compared in constant time since it's a long-lived shared secret, not a
//! per-request nonce — a timing leak would let an attacker recover it byte
//! by byte.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_admin_api_key(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.config().admin_api_key.as_deref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "admin API is not configured").into_response();
    };

    let presented = request.headers().get("x-admin-api-key").and_then(|v| v.to_str().ok());

    let matches = presented
        .map(|p| p.as_bytes().ct_eq(expected.as_bytes()).into())
        .unwrap_or(false);

    if !matches {
        return (StatusCode::UNAUTHORIZED, "invalid or missing x-admin-api-key").into_response();
    }

    next.run(request).await
}
