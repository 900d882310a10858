//! Protocol mapper configuration, persisted per client-scope (used by C4's
//! `ScopeMappers` and executed by C6).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProtocolMapper {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub scope_name: String,
    pub mapper_type: String,
    pub config: serde_json::Value,
}

impl ProtocolMapper {
    /// Ordered list of mappers configured for the given scope names.
    pub async fn for_scopes(
        pool: &PgPool,
        realm_id: Uuid,
        scope_names: &[String],
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, ProtocolMapper>(
            "SELECT * FROM protocol_mappers WHERE realm_id = $1 AND scope_name = ANY($2) ORDER BY scope_name, id",
        )
        .bind(realm_id)
        .bind(scope_names)
        .fetch_all(pool)
        .await
        .context("failed to fetch protocol mappers")
    }
}
