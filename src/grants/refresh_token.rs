//! refresh_token grant (§4.9): rotate via C10; reuse of an already-revoked
//! token poisons the whole session (handled inside `RefreshToken::rotate`
//! itself, which returns `Rejected` either way).

use super::{TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::error::{AppError, AppResult};
use crate::models::realm::Realm;
use crate::models::refresh_token::{RefreshToken, RotationResult};
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

pub async fn handle(state: &AppState, realm: &Realm, form: &TokenForm) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(pool, realm.id, client_id, client_secret, "refresh_token").await?;

    let presented = require(form, "refresh_token")?;

    let rotation = RefreshToken::rotate(pool, presented, realm.refresh_token_lifespan as i64)
        .await
        .map_err(AppError::Internal)?;

    let (opaque, record) = match rotation {
        RotationResult::Rotated { opaque, record } => (opaque, record),
        RotationResult::Rejected => {
            return Err(AppError::invalid_grant("refresh token is invalid or has been revoked"));
        }
    };

    let session = Session::find_by_id(pool, record.session_id)
        .await
        .map_err(AppError::Internal)?
        .filter(Session::is_open)
        .ok_or_else(|| AppError::invalid_grant("session is no longer open"))?;

    let user = User::find_by_id(pool, session.user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("user no longer exists"))?;

    // §4.9: an omitted `scope` here falls back to the session's originally
    // granted scope, not the default ["openid"] (issue_tokens step 2 only
    // sees that default when neither is present).
    let requested_scope = form.get("scope").map(String::as_str).or(session.scope.as_deref());

    issue_tokens(
        pool,
        &state.config().base_url,
        realm,
        &user,
        &client.client_id,
        session.id,
        requested_scope,
        None,
        None,
        Some((opaque, record)),
    )
    .await
    .map_err(AppError::Internal)
}
