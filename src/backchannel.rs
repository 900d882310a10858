//! Backchannel logout (C15): best-effort delivery of OIDC logout tokens to
//! every registered client, run with bounded concurrency so one slow or
//! unreachable client never serializes the others (spec.md §4.12, §5).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::jwt;
use crate::keystore;
use crate::models::client::Client;
use crate::models::realm::Realm;
use crate::state::AppState;

const LOGOUT_TOKEN_TTL_SECONDS: i64 = 120;
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_DELIVERIES: usize = 8;

/// Sign and deliver a logout token to every client in `realm` that has a
/// `backchannelLogoutUri` configured. Every delivery is independent and
/// failures are logged, never propagated — logout must still succeed for
/// the user even if every relying party is unreachable.
pub async fn dispatch_logout(state: &AppState, realm: &Realm, user_id: Uuid, session_id: Option<Uuid>) {
    let pool = state.db();

    let clients = match Client::list_with_backchannel_logout(pool, realm.id).await {
        Ok(clients) => clients,
        Err(e) => {
            tracing::warn!(error = %e, realm = %realm.name, "failed to list backchannel logout clients");
            return;
        }
    };
    if clients.is_empty() {
        return;
    }

    let key = match keystore::active_key(pool, realm.id).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(error = %e, realm = %realm.name, "no signing key available for backchannel logout");
            return;
        }
    };

    let http = reqwest::Client::builder()
        .timeout(DISPATCH_TIMEOUT)
        .build()
        .unwrap_or_default();
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DELIVERIES));
    let issuer = realm.issuer(&state.config().base_url);

    let mut deliveries = tokio::task::JoinSet::new();
    for client in clients {
        let Some(uri) = client.backchannel_logout_uri.clone() else {
            continue;
        };

        let mut payload = json!({
            "iss": issuer,
            "aud": client.client_id,
            "sub": user_id.to_string(),
            "events": { "http://schemas.openid.net/event/backchannel-logout": {} },
        });
        if client.backchannel_logout_session_required {
            if let Some(sid) = session_id {
                payload["sid"] = json!(sid.to_string());
            }
        }

        let logout_token = match jwt::sign_jwt(payload, &key.private_key, &key.kid, LOGOUT_TOKEN_TTL_SECONDS) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, client = %client.client_id, "failed to sign logout token");
                continue;
            }
        };

        let http = http.clone();
        let permit = semaphore.clone();
        let client_id = client.client_id.clone();
        deliveries.spawn(async move {
            let _permit = permit.acquire_owned().await;
            let result = http
                .post(&uri)
                .form(&[("logout_token", logout_token.as_str())])
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    tracing::warn!(client = %client_id, status = %resp.status(), "backchannel logout delivery rejected");
                }
                Err(e) => {
                    tracing::warn!(error = %e, client = %client_id, "backchannel logout delivery failed");
                }
            }
        });
    }

    while deliveries.join_next().await.is_some() {}
}
