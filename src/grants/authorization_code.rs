//! authorization_code grant (§4.9), including PKCE (S256 only).

use super::{TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::crypto;
use crate::error::{AppError, AppResult};
use crate::models::authorization_code::AuthorizationCode;
use crate::models::realm::Realm;
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

pub async fn handle(state: &AppState, realm: &Realm, form: &TokenForm) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(pool, realm.id, client_id, client_secret, "authorization_code").await?;

    let code_param = require(form, "code")?;
    let redirect_uri = require(form, "redirect_uri")?;

    let code = AuthorizationCode::consume(pool, code_param)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("authorization code is unknown or already used"))?;

    if code.client_id != client.id {
        return Err(AppError::invalid_grant("authorization code was not issued to this client"));
    }

    if code.is_expired() {
        return Err(AppError::invalid_grant("authorization code has expired"));
    }

    if code.redirect_uri != redirect_uri {
        return Err(AppError::invalid_grant("redirect_uri does not match the authorization request"));
    }

    if let Some(challenge) = &code.code_challenge {
        let method = code.code_challenge_method.as_deref().unwrap_or("plain");
        if method != "S256" {
            return Err(AppError::invalid_grant("unsupported code_challenge_method"));
        }
        let verifier = require(form, "code_verifier")?;
        if !crypto::pkce_s256_matches(verifier, challenge) {
            return Err(AppError::invalid_grant("code_verifier does not match code_challenge"));
        }
    } else if form.contains_key("code_verifier") {
        return Err(AppError::invalid_grant("code_verifier supplied for a code with no code_challenge"));
    }

    let user = User::find_by_id(pool, code.user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("user no longer exists"))?;

    let session = Session::open(pool, user.id, realm.refresh_token_lifespan as i64, None, None)
        .await
        .map_err(AppError::Internal)?;

    issue_tokens(
        pool,
        &state.config().base_url,
        realm,
        &user,
        &client.client_id,
        session.id,
        Some(code.scope.as_str()),
        code.nonce.as_deref(),
        None,
        None,
    )
    .await
    .map_err(AppError::Internal)
}
