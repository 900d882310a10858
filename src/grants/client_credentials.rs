//! client_credentials grant (§4.9).
//!
//! If the client has a `serviceAccountUserId`, a Session is opened for that
//! synthetic user and the request proceeds through `IssueTokens` like any
//! other grant (it may return a refresh token). Otherwise a minimal access
//! token is signed directly: no session, no refresh token, and — per
//! §4.9 — never an `id_token`.

use serde_json::{Map, json};

use super::{TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::error::{AppError, AppResult};
use crate::jwt;
use crate::keystore;
use crate::models::realm::Realm;
use crate::models::session::Session;
use crate::models::user::User;
use crate::scope;
use crate::state::AppState;

pub async fn handle(state: &AppState, realm: &Realm, form: &TokenForm) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(pool, realm.id, client_id, client_secret, "client_credentials").await?;

    let requested = form.get("scope").map(String::as_str);

    if let Some(service_account_user_id) = client.service_account_user_id {
        let user = User::find_by_id(pool, service_account_user_id)
            .await
            .map_err(AppError::Internal)?
            .ok_or_else(|| AppError::invalid_client("service account user not found"))?;

        let session = Session::open(pool, user.id, realm.refresh_token_lifespan as i64, None, None)
            .await
            .map_err(AppError::Internal)?;

        return issue_tokens(
            pool,
            &state.config().base_url,
            realm,
            &user,
            &client.client_id,
            session.id,
            requested,
            None,
            None,
            None,
        )
        .await
        .map_err(AppError::Internal);
    }

    let key = keystore::active_key(pool, realm.id)
        .await
        .map_err(AppError::Internal)?;

    let parsed = requested.map(scope::parse_and_validate).unwrap_or_default();
    let effective = if parsed.is_empty() {
        vec!["openid".to_string()]
    } else {
        parsed
    };
    let validated_scope = scope::to_string(&effective);

    let mut payload = Map::new();
    payload.insert("iss".into(), json!(realm.issuer(&state.config().base_url)));
    payload.insert("sub".into(), json!(client.id.to_string()));
    payload.insert("aud".into(), json!(client.client_id));
    payload.insert("azp".into(), json!(client.client_id));
    payload.insert("scope".into(), json!(validated_scope));
    payload.insert("typ".into(), json!("Bearer"));

    let access_token = jwt::sign_jwt(
        serde_json::Value::Object(payload),
        &key.private_key,
        &key.kid,
        realm.access_token_lifespan as i64,
    )
    .map_err(AppError::Internal)?;

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: realm.access_token_lifespan as i64,
        refresh_token: None,
        scope: validated_scope,
        id_token: None,
    })
}
