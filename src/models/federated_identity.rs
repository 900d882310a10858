//! FederatedIdentity: link between a local user and an external IdP
//! account. Unique by (identity_provider_id, external_user_id).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederatedIdentity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub identity_provider_id: Uuid,
    pub external_user_id: String,
}

impl FederatedIdentity {
    pub async fn find(
        pool: &PgPool,
        identity_provider_id: Uuid,
        external_user_id: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, FederatedIdentity>(
            "SELECT * FROM federated_identities WHERE identity_provider_id = $1 AND external_user_id = $2",
        )
        .bind(identity_provider_id)
        .bind(external_user_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up federated identity")
    }

    pub async fn link(
        pool: &PgPool,
        user_id: Uuid,
        identity_provider_id: Uuid,
        external_user_id: &str,
    ) -> Result<Self> {
        sqlx::query_as::<_, FederatedIdentity>(
            r#"
            INSERT INTO federated_identities (id, user_id, identity_provider_id, external_user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(identity_provider_id)
        .bind(external_user_id)
        .fetch_one(pool)
        .await
        .context("failed to link federated identity")
    }
}
