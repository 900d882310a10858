//! Introspection, revocation, userinfo, logout (C14).
//!
//! These are read/write services over already-issued tokens, grounded on
//! the same verify-then-blacklist shape as the kernel's OAuth service,
//! adapted to this crate's in-memory [`Blacklist`] instead of a Redis
//! blocklist (spec.md §5 "Blacklist map").

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backchannel;
use crate::error::{AppError, AppResult};
use crate::keystore;
use crate::models::realm::Realm;
use crate::models::refresh_token::RefreshToken;
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

pub(crate) fn claim_str(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn claim_jti(payload: &Map<String, Value>) -> Option<Uuid> {
    claim_str(payload, "jti").and_then(|s| s.parse().ok())
}

fn claim_exp(payload: &Map<String, Value>) -> Option<DateTime<Utc>> {
    payload
        .get("exp")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn claim_sid(payload: &Map<String, Value>) -> Option<Uuid> {
    claim_str(payload, "sid").and_then(|s| s.parse().ok())
}

/// §4.14 state machine: a token carrying `sid` of a session that no longer
/// exists (closed by logout) or has expired must be rejected.
async fn session_is_open(pool: &PgPool, payload: &Map<String, Value>) -> anyhow::Result<bool> {
    let Some(sid) = claim_sid(payload) else {
        // Tokens with no session (client_credentials with no service
        // account) have nothing to check against.
        return Ok(true);
    };
    Ok(Session::find_by_id(pool, sid).await?.is_some_and(|s| s.is_open()))
}

/// `Introspect(realm, token)` — §4.11. Never errors on a bad token; an
/// unverifiable or blacklisted token is simply reported inactive.
pub async fn introspect(state: &AppState, realm: &Realm, token: &str) -> AppResult<Value> {
    let Ok(Value::Object(payload)) = keystore::verify_in_realm(state.db(), realm.id, token).await
    else {
        return Ok(json!({ "active": false }));
    };

    if let Some(jti) = claim_jti(&payload) {
        if state.blacklist().is_blacklisted(jti) {
            return Ok(json!({ "active": false }));
        }
    }

    if !session_is_open(state.db(), &payload).await.map_err(AppError::Internal)? {
        return Ok(json!({ "active": false }));
    }

    let mut out = Map::new();
    out.insert("active".into(), json!(true));
    for key in [
        "sub",
        "iss",
        "aud",
        "exp",
        "iat",
        "scope",
        "preferred_username",
        "email",
        "realm_access",
        "resource_access",
    ] {
        if let Some(v) = payload.get(key) {
            out.insert(key.into(), v.clone());
        }
    }

    Ok(Value::Object(out))
}

/// `Revoke(realm, token, hint?)` — §4.11. Always succeeds (silent
/// no-op if the token is unknown) per RFC 7009 §2.2's "the server responds
/// with HTTP 200 regardless".
pub async fn revoke(state: &AppState, realm: &Realm, token: &str, hint: Option<&str>) -> AppResult<()> {
    let pool = state.db();

    if hint != Some("access") {
        if let Some(record) = RefreshToken::find_by_opaque(pool, token)
            .await
            .map_err(AppError::Internal)?
        {
            RefreshToken::revoke_session(pool, record.session_id)
                .await
                .map_err(AppError::Internal)?;
        }
    }

    if hint != Some("refresh") {
        if let Ok(Value::Object(payload)) = keystore::verify_in_realm(pool, realm.id, token).await {
            if let (Some(jti), Some(exp)) = (claim_jti(&payload), claim_exp(&payload)) {
                state.blacklist().insert(jti, exp);
            }
        }
    }

    Ok(())
}

/// Verified, not-blacklisted claim set for an access token presented to a
/// protected endpoint. Shared by [`userinfo`] and the bearer-auth middleware
/// so both apply exactly the same verify-then-blacklist check.
pub struct VerifiedAccessToken {
    pub payload: Map<String, Value>,
}

pub async fn verify_access_token(state: &AppState, realm: &Realm, access_token: &str) -> AppResult<VerifiedAccessToken> {
    let Value::Object(payload) = keystore::verify_in_realm(state.db(), realm.id, access_token)
        .await
        .map_err(|_| AppError::invalid_token("access token failed verification"))?
    else {
        return Err(AppError::invalid_token("malformed access token payload"));
    };

    if let Some(jti) = claim_jti(&payload) {
        if state.blacklist().is_blacklisted(jti) {
            return Err(AppError::invalid_token("access token has been revoked"));
        }
    }

    if !session_is_open(state.db(), &payload).await.map_err(AppError::Internal)? {
        return Err(AppError::invalid_token("session has been closed"));
    }

    Ok(VerifiedAccessToken { payload })
}

/// `Userinfo(realm, access_token)` — §4.11: verify, check blacklist, load
/// the user, and filter claims by the token's own `scope`.
pub async fn userinfo(state: &AppState, realm: &Realm, access_token: &str) -> AppResult<Value> {
    let VerifiedAccessToken { payload } = verify_access_token(state, realm, access_token).await?;

    let sub = claim_str(&payload, "sub").ok_or_else(|| AppError::invalid_token("token has no sub"))?;
    let user_id: Uuid = sub
        .parse()
        .map_err(|_| AppError::invalid_token("token sub is not a valid user id"))?;
    let scope_str = claim_str(&payload, "scope").unwrap_or_else(|| "openid".to_string());

    claims_for_user(state, user_id, &scope_str).await
}

/// Claim set for a user already authenticated by some other means (e.g. the
/// bearer-auth middleware, which has already verified the token and checked
/// the blacklist), filtered by `scope_str`. Factored out of [`userinfo`] so
/// callers that already hold a verified claim set don't re-verify the JWT.
pub async fn claims_for_user(state: &AppState, user_id: uuid::Uuid, scope_str: &str) -> AppResult<Value> {
    let user = User::find_by_id(state.db(), user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_token("subject user no longer exists"))?;

    let scopes = crate::scope::parse_and_validate(scope_str);
    let allowed = crate::scope::claims_for_scopes(&scopes);
    let mut claims = crate::claims::resolve(&user, &allowed);
    claims.insert("sub".into(), json!(user.id.to_string()));

    Ok(Value::Object(claims))
}

/// `Logout(realm, refresh_token)` — §4.11: revoke the whole session, fire
/// backchannel logout, and delete the Session row.
pub async fn logout(state: &AppState, realm: &Realm, refresh_token: &str) -> AppResult<()> {
    let pool = state.db();

    let record = RefreshToken::find_by_opaque(pool, refresh_token)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("unknown refresh token"))?;

    let session = Session::find_by_id(pool, record.session_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("session already closed"))?;

    RefreshToken::revoke_session(pool, session.id)
        .await
        .map_err(AppError::Internal)?;

    backchannel::dispatch_logout(state, realm, session.user_id, Some(session.id)).await;

    Session::close(pool, session.id).await.map_err(AppError::Internal)?;

    Ok(())
}

pub async fn jwks(pool: &PgPool, realm_id: Uuid) -> AppResult<Vec<crate::jwt::Jwk>> {
    keystore::jwks(pool, realm_id).await.map_err(AppError::Internal)
}
