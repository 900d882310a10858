//! Identity broker (C16): federated login via an external OIDC-ish IdP.
//!
//! `InitiateLogin` hands back the external authorize URL to redirect the
//! browser to; `HandleCallback` exchanges the code, resolves (or creates)
//! the local user, and mints an authorization code bound to the original
//! client so the normal `authorization_code` grant finishes the job.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::keystore;
use crate::models::authorization_code::AuthorizationCode;
use crate::models::client::Client;
use crate::models::federated_identity::FederatedIdentity;
use crate::models::identity_provider::IdentityProvider;
use crate::models::realm::Realm;
use crate::models::user::User;
use crate::state::AppState;

const BROKER_STATE_TTL_SECONDS: i64 = 600;
const EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
struct BrokerState {
    #[serde(rename = "realmId")]
    realm_id: Uuid,
    #[serde(rename = "realmName")]
    realm_name: String,
    alias: String,
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "redirectUri")]
    redirect_uri: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    typ: String,
}

pub struct InitiateLoginParams<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: Option<&'a str>,
    pub state: Option<&'a str>,
    pub nonce: Option<&'a str>,
}

/// `InitiateLogin(realm, alias, params)` — §4.13: returns the external
/// authorize URL to redirect the browser to.
pub async fn initiate_login(
    state: &AppState,
    realm: &Realm,
    alias: &str,
    params: InitiateLoginParams<'_>,
) -> AppResult<String> {
    let pool = state.db();

    let idp = IdentityProvider::find_enabled_by_alias(pool, realm.id, alias)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_request("unknown or disabled identity provider"))?;

    let client = Client::find_by_client_id(pool, realm.id, params.client_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_client("unknown client"))?;

    if !client.allows_redirect_uri(params.redirect_uri) {
        return Err(AppError::invalid_request("redirect_uri is not registered for this client"));
    }

    let broker_state = BrokerState {
        realm_id: realm.id,
        realm_name: realm.name.clone(),
        alias: alias.to_string(),
        client_id: params.client_id.to_string(),
        redirect_uri: params.redirect_uri.to_string(),
        scope: params.scope.map(str::to_string),
        state: params.state.map(str::to_string),
        nonce: params.nonce.map(str::to_string),
        typ: "broker_state".to_string(),
    };

    let key = keystore::active_key(pool, realm.id).await.map_err(AppError::Internal)?;
    let state_jwt = crate::jwt::sign_jwt(
        serde_json::to_value(&broker_state).map_err(|e| AppError::Internal(e.into()))?,
        &key.private_key,
        &key.kid,
        BROKER_STATE_TTL_SECONDS,
    )
    .map_err(AppError::Internal)?;

    let callback_uri = format!(
        "{}/realms/{}/broker/{}/callback",
        state.config().base_url,
        realm.name,
        alias
    );

    let mut url = url::Url::parse(&idp.authorization_url)
        .map_err(|e| AppError::Internal(e.into()))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &idp.client_id)
        .append_pair("scope", &idp.default_scopes)
        .append_pair("state", &state_jwt)
        .append_pair("redirect_uri", &callback_uri);

    Ok(url.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

/// `HandleCallback(realm, alias, code, stateJwt)` — §4.13. Returns the
/// redirect URL back to the original client with a bound authorization code.
pub async fn handle_callback(
    state: &AppState,
    realm: &Realm,
    alias: &str,
    code: &str,
    state_jwt: &str,
) -> AppResult<String> {
    let pool = state.db();

    let broker_state: BrokerState = keystore::verify_in_realm(pool, realm.id, state_jwt)
        .await
        .map_err(|_| AppError::invalid_grant("broker state is invalid or expired"))
        .and_then(|v| serde_json::from_value(v).map_err(|e| AppError::Internal(e.into())))?;

    if broker_state.alias != alias || broker_state.realm_id != realm.id {
        return Err(AppError::invalid_grant("broker state does not match this callback"));
    }

    let idp = IdentityProvider::find_enabled_by_alias(pool, realm.id, alias)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("unknown or disabled identity provider"))?;

    let client = Client::find_by_client_id(pool, realm.id, &broker_state.client_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_client("unknown client"))?;

    let http = reqwest::Client::builder()
        .timeout(EXTERNAL_CALL_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(e.into()))?;

    let callback_uri = format!(
        "{}/realms/{}/broker/{}/callback",
        state.config().base_url,
        realm.name,
        alias
    );

    let token_resp = http
        .post(&idp.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &callback_uri),
            ("client_id", &idp.client_id),
            ("client_secret", &idp.client_secret),
        ])
        .send()
        .await
        .map_err(|_| AppError::invalid_grant("token exchange with identity provider failed"))?;

    if !token_resp.status().is_success() {
        return Err(AppError::invalid_grant("token exchange with identity provider failed"));
    }
    let token: TokenExchangeResponse = token_resp
        .json()
        .await
        .map_err(|_| AppError::invalid_grant("identity provider returned a malformed token response"))?;

    let userinfo_resp = http
        .get(&idp.userinfo_url)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(|_| AppError::invalid_grant("userinfo fetch from identity provider failed"))?;

    if !userinfo_resp.status().is_success() {
        return Err(AppError::invalid_grant("userinfo fetch from identity provider failed"));
    }
    let userinfo: Value = userinfo_resp
        .json()
        .await
        .map_err(|_| AppError::invalid_grant("identity provider returned malformed userinfo"))?;

    let external_sub = userinfo
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::invalid_grant("identity provider userinfo has no sub"))?;
    let external_email = userinfo.get("email").and_then(Value::as_str);
    let preferred_username = userinfo.get("preferred_username").and_then(Value::as_str);

    let user = resolve_user(pool, realm.id, &idp, external_sub, external_email, preferred_username).await?;

    let (auth_code, _record) = AuthorizationCode::issue(
        pool,
        client.id,
        user.id,
        &broker_state.redirect_uri,
        broker_state.scope.as_deref().unwrap_or("openid"),
        broker_state.nonce.as_deref(),
        None,
        None,
    )
    .await
    .map_err(AppError::Internal)?;

    let mut redirect = url::Url::parse(&broker_state.redirect_uri).map_err(|e| AppError::Internal(e.into()))?;
    redirect.query_pairs_mut().append_pair("code", &auth_code);
    if let Some(original_state) = &broker_state.state {
        redirect.query_pairs_mut().append_pair("state", original_state);
    }

    Ok(redirect.to_string())
}

async fn resolve_user(
    pool: &PgPool,
    realm_id: Uuid,
    idp: &IdentityProvider,
    external_sub: &str,
    external_email: Option<&str>,
    preferred_username: Option<&str>,
) -> AppResult<User> {
    if let Some(existing) = FederatedIdentity::find(pool, idp.id, external_sub)
        .await
        .map_err(AppError::Internal)?
    {
        let user = User::find_by_id(pool, existing.user_id)
            .await
            .map_err(AppError::Internal)?
            .ok_or_else(|| AppError::invalid_grant("linked user no longer exists"))?;

        if idp.sync_user_profile {
            User::update_profile(pool, user.id, external_email, None, None)
                .await
                .map_err(AppError::Internal)?;
            return User::find_by_id(pool, user.id)
                .await
                .map_err(AppError::Internal)?
                .ok_or_else(|| AppError::invalid_grant("linked user no longer exists"));
        }
        return Ok(user);
    }

    if idp.trust_email {
        if let Some(email) = external_email {
            if let Some(existing_user) = User::find_by_email(pool, realm_id, email)
                .await
                .map_err(AppError::Internal)?
            {
                FederatedIdentity::link(pool, existing_user.id, idp.id, external_sub)
                    .await
                    .map_err(AppError::Internal)?;
                return Ok(existing_user);
            }
            if idp.link_only {
                return Err(AppError::access_denied("no local account to link for this identity"));
            }
            return create_federated_user(pool, realm_id, &idp.alias, idp.id, external_sub, Some(email), preferred_username)
                .await;
        }
    }

    if idp.link_only {
        return Err(AppError::access_denied("no local account to link for this identity"));
    }
    create_federated_user(pool, realm_id, &idp.alias, idp.id, external_sub, external_email, preferred_username).await
}

#[allow(clippy::too_many_arguments)]
async fn create_federated_user(
    pool: &PgPool,
    realm_id: Uuid,
    alias: &str,
    identity_provider_id: Uuid,
    external_sub: &str,
    email: Option<&str>,
    preferred_username: Option<&str>,
) -> AppResult<User> {
    let username = preferred_username
        .map(str::to_string)
        .or_else(|| email.and_then(|e| e.split('@').next()).map(str::to_string))
        .unwrap_or_else(|| format!("{alias}-{external_sub}"));

    let federation_link = format!("{alias}:{external_sub}");
    let user = User::create(pool, realm_id, &username, email, None, None, None, Some(&federation_link))
        .await
        .map_err(AppError::Internal)?;

    FederatedIdentity::link(pool, user.id, identity_provider_id, external_sub)
        .await
        .map_err(AppError::Internal)?;

    Ok(user)
}
