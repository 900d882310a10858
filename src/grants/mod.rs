//! Grant pipeline (C12): `HandleTokenRequest` dispatches by `grant_type`;
//! every grant flows through [`validate_client`] and converges on
//! [`issue_tokens::issue_tokens`] (§4.10).

mod authorization_code;
mod client_credentials;
mod device_code;
mod issue_tokens;
mod mfa_otp;
mod password;
mod refresh_token;

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::{AppError, AppResult};
use crate::models::client::Client;
use crate::models::realm::Realm;
use crate::state::AppState;

pub use issue_tokens::issue_tokens;

/// `application/x-www-form-urlencoded` body of a token request.
pub type TokenForm = HashMap<String, String>;

/// Caller-supplied request context, carried through for audit logging.
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Entry point: `HandleTokenRequest(realm, form, clientIp, userAgent)`.
pub async fn handle_token_request(
    state: &AppState,
    realm: &Realm,
    form: &TokenForm,
    ctx: &RequestContext,
) -> AppResult<TokenResponse> {
    match form.get("grant_type").map(String::as_str).unwrap_or("") {
        "password" => password::handle(state, realm, form, ctx).await,
        "client_credentials" => client_credentials::handle(state, realm, form).await,
        "refresh_token" => refresh_token::handle(state, realm, form).await,
        "authorization_code" => authorization_code::handle(state, realm, form).await,
        "urn:ietf:params:oauth:grant-type:device_code" => {
            device_code::handle(state, realm, form).await
        }
        "mfa_otp" => mfa_otp::handle(state, realm, form, ctx).await,
        "" => Err(AppError::invalid_request("missing grant_type")),
        _ => Err(AppError::unsupported_grant_type("unsupported grant_type")),
    }
}

pub(crate) fn require<'a>(form: &'a TokenForm, key: &str) -> AppResult<&'a str> {
    form.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::invalid_request(format!("missing {key}")))
}

/// ValidateClient(realm, clientId, clientSecret?, grantType) — §4.9.
///
/// PUBLIC clients skip the secret check entirely (no oracle: the stored
/// hash field is never even read for them; §9 open question — do not
/// change this behavior).
pub(crate) async fn validate_client(
    pool: &PgPool,
    realm_id: Uuid,
    client_id: &str,
    client_secret: Option<&str>,
    grant_type: &str,
) -> AppResult<Client> {
    if client_id.is_empty() {
        return Err(AppError::invalid_request("missing client_id"));
    }

    let client = Client::find_by_client_id(pool, realm_id, client_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_client("unknown client"))?;

    if !client.enabled {
        return Err(AppError::invalid_client("client disabled"));
    }

    if !client.supports_grant_type(grant_type) {
        return Err(AppError::unauthorized_client(
            "grant type not allowed for this client",
        ));
    }

    if client.is_confidential() {
        let secret = client_secret.ok_or_else(|| AppError::invalid_client("missing client_secret"))?;
        let hash = client
            .client_secret_hash
            .as_deref()
            .ok_or_else(|| AppError::invalid_client("client has no configured secret"))?;
        let ok = crypto::verify_password(hash, secret).map_err(AppError::Internal)?;
        if !ok {
            return Err(AppError::invalid_client("client secret mismatch"));
        }
    }

    Ok(client)
}
