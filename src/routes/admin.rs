//! Minimal admin surface (§6 "Admin REST").
//!
//! The full CRUD surface over realms/users/clients/roles is an external
//! collaborator; this module only exposes the thin read surface the core
//! is responsible for, gated by the same `x-admin-api-key` header the
//! external admin API uses.

use axum::Json;
use axum::extract::{Path, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::middleware::admin_api_key::require_admin_api_key;
use crate::models::realm::Realm;
use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/realms", get(list_realms))
        .route("/admin/realms/{name}", get(get_realm))
        .layer(middleware::from_fn_with_state(state, require_admin_api_key))
}

async fn list_realms(State(state): State<AppState>) -> Response {
    match Realm::list(state.db()).await {
        Ok(realms) => Json(realms).into_response(),
        Err(e) => AppError::Internal(e).into_response(),
    }
}

async fn get_realm(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match Realm::find_by_name(state.db(), &name).await {
        Ok(Some(realm)) => Json(realm).into_response(),
        Ok(None) => AppError::NotFound.into_response(),
        Err(e) => AppError::Internal(e).into_response(),
    }
}
