//! Signing-key model (C3 key store persistence layer).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Per-realm RS256 signing key. Invariant: exactly one active key per realm;
/// inactive keys remain for verification until an admin deletes them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SigningKey {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub kid: String,
    pub algorithm: String,
    pub public_key: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl SigningKey {
    /// The most recently created active signing key for a realm.
    pub async fn active_for_realm(pool: &PgPool, realm_id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, SigningKey>(
            r#"
            SELECT * FROM signing_keys
            WHERE realm_id = $1 AND active = true
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(realm_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch active signing key")
    }

    pub async fn find_by_kid(pool: &PgPool, realm_id: Uuid, kid: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, SigningKey>(
            "SELECT * FROM signing_keys WHERE realm_id = $1 AND kid = $2",
        )
        .bind(realm_id)
        .bind(kid)
        .fetch_optional(pool)
        .await
        .context("failed to fetch signing key by kid")
    }

    /// All keys still retained for JWKS verification: the active key plus
    /// any retired keys an admin has not yet deleted.
    pub async fn all_for_realm(pool: &PgPool, realm_id: Uuid) -> Result<Vec<Self>> {
        sqlx::query_as::<_, SigningKey>(
            "SELECT * FROM signing_keys WHERE realm_id = $1 ORDER BY created_at DESC",
        )
        .bind(realm_id)
        .fetch_all(pool)
        .await
        .context("failed to list signing keys")
    }

    /// Insert a freshly generated key as the new active key, deactivating
    /// the previous one in the same transaction.
    pub async fn rotate(
        pool: &PgPool,
        realm_id: Uuid,
        kid: &str,
        public_pem: &str,
        private_pem: &str,
    ) -> Result<Self> {
        let mut tx = pool.begin().await.context("failed to start transaction")?;

        sqlx::query("UPDATE signing_keys SET active = false WHERE realm_id = $1 AND active = true")
            .bind(realm_id)
            .execute(&mut *tx)
            .await
            .context("failed to deactivate previous signing key")?;

        let key = sqlx::query_as::<_, SigningKey>(
            r#"
            INSERT INTO signing_keys (id, realm_id, kid, algorithm, public_key, private_key, active)
            VALUES ($1, $2, $3, 'RS256', $4, $5, true)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(realm_id)
        .bind(kid)
        .bind(public_pem)
        .bind(private_pem)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert new signing key")?;

        tx.commit().await.context("failed to commit key rotation")?;
        Ok(key)
    }

    pub async fn delete(pool: &PgPool, realm_id: Uuid, kid: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM signing_keys WHERE realm_id = $1 AND kid = $2")
            .bind(realm_id)
            .bind(kid)
            .execute(pool)
            .await
            .context("failed to delete signing key")?;
        Ok(result.rows_affected() > 0)
    }
}
