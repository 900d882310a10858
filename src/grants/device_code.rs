//! `urn:ietf:params:oauth:grant-type:device_code` grant (§4.9, RFC 8628):
//! poll-until-approved flow. `touch_polled` always runs before the interval
//! is evaluated so an attacker can't dodge `slow_down` by never polling.

use chrono::Utc;

use super::{TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::error::{AppError, AppResult};
use crate::models::device_code::DeviceCode;
use crate::models::realm::Realm;
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

pub async fn handle(state: &AppState, realm: &Realm, form: &TokenForm) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(
        pool,
        realm.id,
        client_id,
        client_secret,
        "urn:ietf:params:oauth:grant-type:device_code",
    )
    .await?;

    let presented = require(form, "device_code")?;

    let code = DeviceCode::find_by_device_code(pool, realm.id, presented)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("unknown device_code"))?;

    if code.client_id != client.id {
        return Err(AppError::invalid_grant("device_code was not issued to this client"));
    }

    if code.is_expired() {
        return Err(AppError::expired_token("device_code has expired"));
    }

    if code.denied {
        return Err(AppError::access_denied("user denied the authorization request"));
    }

    let previous_poll = code.last_polled_at;
    DeviceCode::touch_polled(pool, code.id).await.map_err(AppError::Internal)?;

    if let Some(last) = previous_poll {
        let elapsed = Utc::now().signed_duration_since(last).num_seconds();
        if elapsed < code.interval as i64 {
            return Err(AppError::slow_down("polling too frequently"));
        }
    }

    if !code.approved {
        return Err(AppError::authorization_pending("authorization request is still pending"));
    }

    let user_id = code
        .user_id
        .ok_or_else(|| AppError::invalid_grant("device_code approved without a bound user"))?;
    let user = User::find_by_id(pool, user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("user no longer exists"))?;

    DeviceCode::consume(pool, code.id).await.map_err(AppError::Internal)?;

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
        None,
        None,
        None,
    )
    .await
    .map_err(AppError::Internal)
}
