//! Identity broker HTTP surface (§4.13): thin wrapper over [`crate::broker`].

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::broker::{self, InitiateLoginParams};
use crate::error::AppError;
use crate::models::realm::Realm;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/realms/{realm}/broker/{alias}",
        Router::new()
            .route("/login", get(login))
            .route("/callback", get(callback)),
    )
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    client_id: String,
    redirect_uri: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Path((realm_name, alias)): Path<(String, String)>,
    Query(params): Query<LoginParams>,
) -> Response {
    let realm = match Realm::find_by_name(state.db(), &realm_name).await {
        Ok(Some(r)) if r.enabled => r,
        Ok(_) => return AppError::NotFound.into_response(),
        Err(e) => return AppError::Internal(e).into_response(),
    };

    let result = broker::initiate_login(
        &state,
        &realm,
        &alias,
        InitiateLoginParams {
            client_id: &params.client_id,
            redirect_uri: &params.redirect_uri,
            scope: params.scope.as_deref(),
            state: params.state.as_deref(),
            nonce: params.nonce.as_deref(),
        },
    )
    .await;

    match result {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: String,
    state: String,
}

async fn callback(
    State(state): State<AppState>,
    Path((realm_name, alias)): Path<(String, String)>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let realm = match Realm::find_by_name(state.db(), &realm_name).await {
        Ok(Some(r)) if r.enabled => r,
        Ok(_) => return AppError::NotFound.into_response(),
        Err(e) => return AppError::Internal(e).into_response(),
    };

    match broker::handle_callback(&state, &realm, &alias, &params.code, &params.state).await {
        Ok(redirect_url) => Redirect::to(&redirect_url).into_response(),
        Err(e) => e.into_response(),
    }
}
