//! password grant (§4.9).

use serde_json::json;

use super::{RequestContext, TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::crypto;
use crate::error::{AppError, AppResult};
use crate::mfa;
use crate::models::realm::Realm;
use crate::models::session::Session;
use crate::models::user::User;
use crate::password_policy;
use crate::state::AppState;

pub async fn handle(
    state: &AppState,
    realm: &Realm,
    form: &TokenForm,
    ctx: &RequestContext,
) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(pool, realm.id, client_id, client_secret, "password").await?;

    let username = require(form, "username")?;
    let password = require(form, "password")?;

    let user = User::find_by_username(pool, realm.id, username)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("invalid username or password"))?;

    if !user.enabled || (user.password_hash.is_none() && user.federation_link.is_none()) {
        return Err(AppError::invalid_grant("invalid username or password"));
    }

    let lock = state
        .lockout()
        .check_locked(user.id)
        .await
        .map_err(AppError::Internal)?;
    if lock.locked {
        return Err(AppError::invalid_grant("account is temporarily locked"));
    }

    // No federation collaborator is wired up in this deployment (out of
    // scope per §1); a federationLink always falls through to password
    // verification against the stored hash when one exists.
    let verified = match &user.password_hash {
        Some(hash) => crypto::verify_password(hash, password).unwrap_or(false),
        None => false,
    };

    if !verified {
        state
            .lockout()
            .record_failure(realm, user.id)
            .await
            .map_err(AppError::Internal)?;
        tracing::info!(user_id = %user.id, ip = ?ctx.client_ip, "login failed");
        return Err(AppError::invalid_grant("invalid username or password"));
    }
    state
        .lockout()
        .reset_failures(user.id)
        .await
        .map_err(AppError::Internal)?;

    if password_policy::is_expired(&user, realm) {
        return Err(AppError::invalid_grant("password expired"));
    }

    let has_totp = crate::models::mfa::UserCredential::find_totp(pool, user.id)
        .await
        .map_err(AppError::Internal)?;
    let mfa_enabled = mfa::is_mfa_enabled_sync(&has_totp);

    if mfa_enabled {
        let mfa_token = mfa::create_challenge(
            pool,
            user.id,
            realm.id,
            json!({
                "clientId": client.client_id,
                "scope": form.get("scope"),
            }),
        )
        .await
        .map_err(AppError::Internal)?;
        return Err(AppError::MfaRequired { mfa_token });
    }
    if realm.mfa_required && !mfa_enabled {
        return Err(AppError::invalid_grant("MFA setup required"));
    }

    let session = Session::open(
        pool,
        user.id,
        realm.refresh_token_lifespan as i64,
        ctx.client_ip.as_deref(),
        ctx.user_agent.as_deref(),
    )
    .await
    .map_err(AppError::Internal)?;

    tracing::info!(user_id = %user.id, ip = ?ctx.client_ip, "login succeeded");

    issue_tokens(
        pool,
        &state.config().base_url,
        realm,
        &user,
        &client.client_id,
        session.id,
        form.get("scope").map(String::as_str),
        None,
        None,
        None,
    )
    .await
    .map_err(AppError::Internal)
}
