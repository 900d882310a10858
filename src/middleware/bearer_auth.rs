//! Bearer token authentication middleware.
//!
//! Checks `Authorization: Bearer <token>`, verifies the JWT against the
//! realm named in the path, checks the blacklist, and stashes the claims in
//! request extensions. No Authorization header at all passes through
//! unauthenticated (some protected routes also accept client auth in the
//! body); a present-but-invalid token is rejected with 401.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::models::realm::Realm;
use crate::oidc::{self, claim_jti, claim_str};
use crate::state::AppState;

pub async fn authenticate_bearer_token(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request.headers().get("Authorization").and_then(|v| v.to_str().ok());

    let Some(auth_header) = auth_header else {
        return next.run(request).await;
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return next.run(request).await;
    };

    let realm = match Realm::find_by_name(state.db(), &realm_name).await {
        Ok(Some(realm)) => realm,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown realm").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to look up realm for bearer auth");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    let verified = match oidc::verify_access_token(&state, &realm, token).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "invalid bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                [("WWW-Authenticate", "Bearer error=\"invalid_token\"")],
                "invalid token",
            )
                .into_response();
        }
    };

    let Some(sub) = claim_str(&verified.payload, "sub").and_then(|s| s.parse::<Uuid>().ok()) else {
        return (StatusCode::UNAUTHORIZED, "invalid token subject").into_response();
    };
    let client_id = claim_str(&verified.payload, "azp")
        .or_else(|| claim_str(&verified.payload, "aud"))
        .unwrap_or_default();
    let scope = claim_str(&verified.payload, "scope").unwrap_or_default();
    let jti = claim_jti(&verified.payload);

    request.extensions_mut().insert(BearerAuth {
        realm_id: realm.id,
        user_id: sub,
        client_id,
        scope,
        jti,
    });

    next.run(request).await
}

/// Bearer authentication info extracted from a valid access token.
///
/// `user_id` is the token's `sub`: for most grants a real user id, for a
/// service-account-less `client_credentials` token the client's own id —
/// handlers that need a real user should re-resolve it and treat a lookup
/// miss as unauthorized rather than assuming `user_id` always names a user.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: String,
    pub jti: Option<Uuid>,
}
