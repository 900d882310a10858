//! PendingAction: single-use, TTL-bound tokens used for MFA challenges and
//! similar one-shot flows (spec.md §3, §4.9).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::crypto;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingAction {
    pub token_hash: String,
    pub action_type: String,
    pub data: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub async fn create(
        pool: &PgPool,
        action_type: &str,
        data: serde_json::Value,
        ttl_seconds: i64,
    ) -> Result<String> {
        let opaque = crypto::generate_secret(32);
        let token_hash = crypto::sha256_hex(&opaque);

        sqlx::query(
            r#"
            INSERT INTO pending_actions (token_hash, action_type, data, expires_at)
            VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))
            "#,
        )
        .bind(&token_hash)
        .bind(action_type)
        .bind(&data)
        .bind(ttl_seconds as f64)
        .execute(pool)
        .await
        .context("failed to create pending action")?;

        Ok(opaque)
    }

    pub async fn find_by_opaque(pool: &PgPool, opaque: &str) -> Result<Option<Self>> {
        let token_hash = crypto::sha256_hex(opaque);
        let record =
            sqlx::query_as::<_, PendingAction>("SELECT * FROM pending_actions WHERE token_hash = $1")
                .bind(&token_hash)
                .fetch_optional(pool)
                .await
                .context("failed to look up pending action")?;

        match record {
            Some(r) if r.expires_at <= Utc::now() => {
                // Lazily delete expired records on read.
                Self::delete(pool, opaque).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Single-use: consume and delete in one step.
    pub async fn consume(pool: &PgPool, opaque: &str) -> Result<Option<Self>> {
        let record = Self::find_by_opaque(pool, opaque).await?;
        if record.is_some() {
            Self::delete(pool, opaque).await?;
        }
        Ok(record)
    }

    /// Replace `data` in place without resetting the TTL, used by the
    /// retry-aware MFA validator to persist an incremented `attempts`
    /// counter while keeping the record alive.
    pub async fn update_data(pool: &PgPool, opaque: &str, data: serde_json::Value) -> Result<()> {
        let token_hash = crypto::sha256_hex(opaque);
        sqlx::query("UPDATE pending_actions SET data = $1 WHERE token_hash = $2")
            .bind(&data)
            .bind(&token_hash)
            .execute(pool)
            .await
            .context("failed to update pending action data")?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, opaque: &str) -> Result<()> {
        let token_hash = crypto::sha256_hex(opaque);
        sqlx::query("DELETE FROM pending_actions WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(pool)
            .await
            .context("failed to delete pending action")?;
        Ok(())
    }

    pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_actions WHERE expires_at < NOW()")
            .execute(pool)
            .await
            .context("failed to garbage-collect expired pending actions")?;
        Ok(result.rows_affected())
    }
}
