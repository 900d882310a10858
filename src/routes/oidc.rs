//! OIDC endpoints (§6), all rooted at
//! `/realms/{name}/protocol/openid-connect/`.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::grants::{self, RequestContext, TokenForm};
use crate::keystore;
use crate::middleware::bearer_auth::{self, BearerAuth};
use crate::models::authorization_code::AuthorizationCode;
use crate::models::client::Client;
use crate::models::login_session::LoginSession;
use crate::models::realm::Realm;
use crate::oidc;
use crate::scope;
use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/userinfo", get(userinfo))
        .layer(middleware::from_fn_with_state(state, bearer_auth::authenticate_bearer_token));

    Router::new()
        .nest(
            "/realms/{realm}/protocol/openid-connect",
            Router::new()
                .route("/token", post(token))
                .route("/token/introspect", post(introspect))
                .route("/revoke", post(revoke))
                .route("/logout", post(logout))
                .route("/certs", get(certs))
                .route("/.well-known/openid-configuration", get(discovery))
                .route("/auth", get(authorize))
                .merge(protected),
        )
        .route("/realms/{realm}/.well-known/openid-configuration", get(discovery))
}

async fn realm_or_404(state: &AppState, name: &str) -> AppResult<Realm> {
    Realm::find_by_name(state.db(), name)
        .await
        .map_err(AppError::Internal)?
        .filter(|r| r.enabled)
        .ok_or(AppError::NotFound)
}

/// POST `token` — the grant pipeline's single entry point. A successful
/// token response is HTTP 201 (§8 scenario A); the MFA branch rides inside
/// `AppError::MfaRequired`, which renders its own 200.
async fn token(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    headers: header::HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    let ctx = RequestContext {
        client_ip: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match grants::handle_token_request(&state, &realm, &form, &ctx).await {
        Ok(response) => (
            StatusCode::CREATED,
            [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
            Json(response),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectForm {
    token: String,
}

async fn introspect(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    Form(form): Form<IntrospectForm>,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match oidc::introspect(&state, &realm, &form.token).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RevokeForm {
    token: String,
    #[serde(default, rename = "token_type_hint")]
    token_type_hint: Option<String>,
}

/// POST `revoke` — RFC 7009 §2.2: the server responds 200 regardless of
/// whether the token was known, to avoid turning this into a token oracle.
async fn revoke(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    Form(form): Form<RevokeForm>,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = oidc::revoke(&state, &realm, &form.token, form.token_type_hint.as_deref()).await {
        if matches!(e, AppError::Internal(_) | AppError::Database(_)) {
            return e.into_response();
        }
    }

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
struct LogoutForm {
    refresh_token: String,
}

async fn logout(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    Form(form): Form<LogoutForm>,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match oidc::logout(&state, &realm, &form.refresh_token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn userinfo(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    axum::Extension(auth): axum::Extension<BearerAuth>,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    if auth.realm_id != realm.id {
        return AppError::invalid_token("token was not issued for this realm").into_response();
    }

    // The token has already been verified and blacklist-checked by the
    // bearer-auth middleware; re-derive claims by user id rather than
    // re-parsing the raw header here.
    match oidc::claims_for_user(&state, auth.user_id, &auth.scope).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn certs(State(state): State<AppState>, Path(realm_name): Path<String>) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match keystore::jwks(state.db(), realm.id).await {
        Ok(keys) => Json(json!({ "keys": keys })).into_response(),
        Err(e) => AppError::Internal(e).into_response(),
    }
}

async fn discovery(State(state): State<AppState>, Path(realm_name): Path<String>) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    let issuer = realm.issuer(&state.config().base_url);
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
        "token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
        "userinfo_endpoint": format!("{issuer}/protocol/openid-connect/userinfo"),
        "introspection_endpoint": format!("{issuer}/protocol/openid-connect/token/introspect"),
        "revocation_endpoint": format!("{issuer}/protocol/openid-connect/revoke"),
        "end_session_endpoint": format!("{issuer}/protocol/openid-connect/logout"),
        "jwks_uri": format!("{issuer}/protocol/openid-connect/certs"),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "email", "roles", "offline_access"],
        "grant_types_supported": [
            "authorization_code",
            "password",
            "client_credentials",
            "refresh_token",
            "urn:ietf:params:oauth:grant-type:device_code",
        ],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "code_challenge_methods_supported": ["S256"],
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    response_type: String,
    client_id: String,
    redirect_uri: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    code_challenge: Option<String>,
    #[serde(default)]
    code_challenge_method: Option<String>,
}

/// GET `auth` — initiates the authorization-code flow. Whether the caller
/// is already browser-authenticated is decided by the `login_session`
/// cookie set by the (out-of-scope) login HTML flow; when absent this
/// hands off to that external collaborator instead of minting a code.
async fn authorize(
    State(state): State<AppState>,
    Path(realm_name): Path<String>,
    Query(params): Query<AuthorizeParams>,
    session: tower_sessions::Session,
) -> Response {
    let realm = match realm_or_404(&state, &realm_name).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if params.response_type != "code" {
        return AppError::invalid_request("response_type must be \"code\"").into_response();
    }

    let client = match Client::find_by_client_id(state.db(), realm.id, &params.client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return AppError::invalid_client("unknown client").into_response(),
        Err(e) => return AppError::Internal(e).into_response(),
    };

    if !client.allows_redirect_uri(&params.redirect_uri) {
        return AppError::invalid_request("redirect_uri is not registered for this client").into_response();
    }

    if !client.is_confidential() && params.code_challenge.is_none() {
        return AppError::invalid_request("PKCE is required for public clients").into_response();
    }
    if let Some(method) = &params.code_challenge_method {
        if method != "S256" {
            return AppError::invalid_request("unsupported code_challenge_method").into_response();
        }
    }

    let login_token: Option<String> = session.get("login_token").await.ok().flatten();
    let login_session = match login_token {
        Some(token) => LoginSession::find_by_opaque(state.db(), &token).await.ok().flatten(),
        None => None,
    };

    let Some(login_session) = login_session.filter(|s| s.expires_at > chrono::Utc::now() && s.realm_id == realm.id)
    else {
        let mut continuation = url::form_urlencoded::Serializer::new(String::new());
        continuation
            .append_pair("response_type", &params.response_type)
            .append_pair("client_id", &params.client_id)
            .append_pair("redirect_uri", &params.redirect_uri);
        if let Some(scope) = &params.scope {
            continuation.append_pair("scope", scope);
        }
        if let Some(st) = &params.state {
            continuation.append_pair("state", st);
        }
        if let Some(nonce) = &params.nonce {
            continuation.append_pair("nonce", nonce);
        }
        if let Some(c) = &params.code_challenge {
            continuation.append_pair("code_challenge", c);
        }
        if let Some(m) = &params.code_challenge_method {
            continuation.append_pair("code_challenge_method", m);
        }
        return Redirect::to(&format!(
            "{}/realms/{}/login?{}",
            state.config().base_url,
            realm.name,
            continuation.finish()
        ))
        .into_response();
    };

    let requested = params.scope.as_deref().map(scope::parse_and_validate).unwrap_or_default();
    let granted = scope::client_effective_scopes(&client, &requested);
    let granted_scope = scope::to_string(&granted);

    let (code, _record) = match AuthorizationCode::issue(
        state.db(),
        client.id,
        login_session.user_id,
        &params.redirect_uri,
        &granted_scope,
        params.nonce.as_deref(),
        params.code_challenge.as_deref(),
        params.code_challenge_method.as_deref(),
    )
    .await
    {
        Ok(v) => v,
        Err(e) => return AppError::Internal(e).into_response(),
    };

    let mut redirect = match url::Url::parse(&params.redirect_uri) {
        Ok(u) => u,
        Err(e) => return AppError::Internal(e.into()).into_response(),
    };
    redirect.query_pairs_mut().append_pair("code", &code);
    if let Some(st) = &params.state {
        redirect.query_pairs_mut().append_pair("state", st);
    }

    Redirect::to(redirect.as_str()).into_response()
}
