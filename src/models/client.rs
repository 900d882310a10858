//! Client (OAuth2 client application) model.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ClientType {
    Confidential,
    Public,
}

/// Client record. Invariants (spec.md §3): CONFIDENTIAL ⇒ non-null secret
/// hash; PUBLIC ⇒ no secret required; a grant is allowed only if it appears
/// in `grant_types`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub client_id: String,
    pub client_type: ClientType,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub enabled: bool,
    pub grant_types: Vec<String>,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    pub service_account_user_id: Option<Uuid>,
    pub backchannel_logout_uri: Option<String>,
    pub backchannel_logout_session_required: bool,
    pub default_scopes: Vec<String>,
    pub optional_scopes: Vec<String>,
}

impl Client {
    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    pub async fn find_by_client_id(
        pool: &PgPool,
        realm_id: Uuid,
        client_id: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE realm_id = $1 AND client_id = $2",
        )
        .bind(realm_id)
        .bind(client_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch client by client_id")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch client by id")
    }

    pub async fn list_with_backchannel_logout(
        pool: &PgPool,
        realm_id: Uuid,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE realm_id = $1 AND backchannel_logout_uri IS NOT NULL",
        )
        .bind(realm_id)
        .fetch_all(pool)
        .await
        .context("failed to list clients with backchannel logout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client(client_type: ClientType) -> Client {
        Client {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            client_id: "test".to_string(),
            client_type,
            client_secret_hash: None,
            enabled: true,
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            redirect_uris: vec!["https://app/cb".to_string()],
            web_origins: vec![],
            service_account_user_id: None,
            backchannel_logout_uri: None,
            backchannel_logout_session_required: false,
            default_scopes: vec!["openid".to_string()],
            optional_scopes: vec![],
        }
    }

    #[test]
    fn grant_type_membership() {
        let client = sample_client(ClientType::Public);
        assert!(client.supports_grant_type("authorization_code"));
        assert!(!client.supports_grant_type("client_credentials"));
    }

    #[test]
    fn redirect_uri_exact_match_only() {
        let client = sample_client(ClientType::Public);
        assert!(client.allows_redirect_uri("https://app/cb"));
        assert!(!client.allows_redirect_uri("https://app/cb/"));
        assert!(!client.allows_redirect_uri("https://evil/cb"));
    }

    #[test]
    fn confidential_vs_public() {
        assert!(sample_client(ClientType::Confidential).is_confidential());
        assert!(!sample_client(ClientType::Public).is_confidential());
    }
}
