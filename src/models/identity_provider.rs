//! IdentityProvider: opaque external-IdP configuration consumed by the
//! identity broker (C16). Treated as configuration, not core logic — the
//! SAML/LDAP collaborators this also backs are out of scope (spec.md §1).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityProvider {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub alias: String,
    pub enabled: bool,
    pub authorization_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub default_scopes: String,
    pub trust_email: bool,
    pub link_only: bool,
    pub sync_user_profile: bool,
}

impl IdentityProvider {
    pub async fn find_enabled_by_alias(
        pool: &PgPool,
        realm_id: Uuid,
        alias: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, IdentityProvider>(
            "SELECT * FROM identity_providers WHERE realm_id = $1 AND alias = $2 AND enabled = true",
        )
        .bind(realm_id)
        .bind(alias)
        .fetch_optional(pool)
        .await
        .context("failed to fetch identity provider")
    }
}
