//! IssueTokens (§4.10): the core token builder every grant converges on.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use super::TokenResponse;
use crate::claims;
use crate::jwt;
use crate::keystore;
use crate::mappers::{self, MapperContext};
use crate::models::client::Client;
use crate::models::protocol_mapper::ProtocolMapper;
use crate::models::realm::Realm;
use crate::models::refresh_token::RefreshToken;
use crate::models::role::Role;
use crate::models::session::Session;
use crate::models::user::User;
use crate::scope;

/// `IssueTokens(realm, user, clientId, sessionId, scope?, nonce?, authTime?)`.
///
/// `pre_rotated`, when given, is an opaque refresh token (and its record)
/// already minted by a rotation (`RefreshToken::rotate`); it is used as-is
/// instead of minting a second, orphaned token via `RefreshToken::issue`.
#[allow(clippy::too_many_arguments)]
pub async fn issue_tokens(
    pool: &PgPool,
    base_url: &str,
    realm: &Realm,
    user: &User,
    client_id: &str,
    session_id: Uuid,
    scope: Option<&str>,
    nonce: Option<&str>,
    auth_time: Option<DateTime<Utc>>,
    pre_rotated: Option<(String, RefreshToken)>,
) -> Result<TokenResponse> {
    // 1. Resolve active signing key.
    let key = keystore::active_key(pool, realm.id).await?;

    // 2. Effective scopes: parseAndValidate(scope) || ["openid"].
    let requested = scope.map(scope::parse_and_validate).unwrap_or_default();
    let effective_scopes = if requested.is_empty() {
        vec!["openid".to_string()]
    } else {
        requested
    };
    let validated_scope = scope::to_string(&effective_scopes);
    Session::set_scope(pool, session_id, &validated_scope).await?;

    // 3. Claim filtering.
    let allowed = scope::claims_for_scopes(&effective_scopes);
    let user_claims = claims::resolve(user, &allowed);

    // 4. Role claims: union of direct + group-inherited roles, partitioned
    // into realm-scoped and client-scoped (keyed by the owning client's
    // client_id string, not its internal uuid).
    let roles = Role::effective_for_user(pool, user.id).await?;
    let include_roles = scope.is_none() || allowed.contains("realm_access");

    let mut realm_roles: Vec<String> = Vec::new();
    let mut client_role_ids: HashMap<Uuid, Vec<String>> = HashMap::new();
    for role in &roles {
        match role.client_id {
            None => realm_roles.push(role.name.clone()),
            Some(cid) => client_role_ids.entry(cid).or_default().push(role.name.clone()),
        }
    }

    let mut resource_access: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (cid, role_names) in &client_role_ids {
        if let Some(client) = Client::find_by_id(pool, *cid).await? {
            resource_access.insert(client.client_id, role_names.clone());
        }
    }

    // 5. Protocol mappers.
    let mappers = ProtocolMapper::for_scopes(pool, realm.id, &effective_scopes).await?;
    let mapper_ctx = MapperContext {
        user_id: &user.id.to_string(),
        username: &user.username,
        email: user.email.as_deref(),
        email_verified: user.email_verified,
        first_name: user.first_name.as_deref(),
        last_name: user.last_name.as_deref(),
        realm_roles: &realm_roles,
        resource_access: &resource_access,
    };

    // 6. Assemble access-token payload.
    let issuer = realm.issuer(base_url);
    let mut access_payload = Map::new();
    access_payload.insert("iss".into(), json!(issuer));
    access_payload.insert("sub".into(), json!(user.id.to_string()));
    access_payload.insert("aud".into(), json!(client_id));
    access_payload.insert("azp".into(), json!(client_id));
    access_payload.insert("typ".into(), json!("Bearer"));
    access_payload.insert("scope".into(), json!(validated_scope));
    access_payload.insert("sid".into(), json!(session_id.to_string()));
    for (k, v) in &user_claims {
        access_payload.insert(k.clone(), v.clone());
    }
    if include_roles {
        access_payload.insert("realm_access".into(), json!({ "roles": realm_roles }));
        access_payload.insert("resource_access".into(), json!(resource_access));
    }
    // On mapper failure we have nothing to catch (mapper execution is
    // infallible by construction; unknown mapper types are silently
    // ignored) so step 5's "swallow and continue" is satisfied by design.
    mappers::execute(&mappers, &mapper_ctx, &mut access_payload);

    let access_token = jwt::sign_jwt(
        Value::Object(access_payload),
        &key.private_key,
        &key.kid,
        realm.access_token_lifespan as i64,
    )?;

    // 8. Refresh token: reuse a pre-rotated one if supplied, else mint fresh.
    let refresh_token = match pre_rotated {
        Some((opaque, _record)) => opaque,
        None => {
            let is_offline = effective_scopes.iter().any(|s| s == "offline_access");
            let refresh_ttl = if is_offline {
                realm.offline_token_lifespan
            } else {
                realm.refresh_token_lifespan
            };
            let (opaque, _record) =
                RefreshToken::issue(pool, session_id, refresh_ttl as i64, is_offline).await?;
            opaque
        }
    };

    // 9. Optional id_token.
    let id_token = if scope::has_openid(&effective_scopes) {
        let mut id_payload = Map::new();
        id_payload.insert("iss".into(), json!(issuer));
        id_payload.insert("sub".into(), json!(user.id.to_string()));
        id_payload.insert("aud".into(), json!(client_id));
        id_payload.insert("azp".into(), json!(client_id));
        id_payload.insert("typ".into(), json!("ID"));
        id_payload.insert("sid".into(), json!(session_id.to_string()));
        id_payload.insert("at_hash".into(), json!(jwt::compute_at_hash(&access_token)));
        id_payload.insert(
            "auth_time".into(),
            json!(auth_time.unwrap_or_else(Utc::now).timestamp()),
        );
        id_payload.insert("acr".into(), json!("1"));
        for (k, v) in &user_claims {
            id_payload.insert(k.clone(), v.clone());
        }
        if let Some(nonce) = nonce {
            id_payload.insert("nonce".into(), json!(nonce));
        }

        Some(jwt::sign_jwt(
            Value::Object(id_payload),
            &key.private_key,
            &key.kid,
            realm.access_token_lifespan as i64,
        )?)
    } else {
        None
    };

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: realm.access_token_lifespan as i64,
        refresh_token: Some(refresh_token),
        scope: validated_scope,
        id_token,
    })
}
