//! Password-history records, trimmed to the newest N per user (spec.md §3).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordHistory {
    pub user_id: Uuid,
    pub realm_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PasswordHistory {
    /// Newest `n` history hashes for a user, most recent first.
    pub async fn newest(pool: &PgPool, user_id: Uuid, n: i64) -> Result<Vec<Self>> {
        sqlx::query_as::<_, PasswordHistory>(
            "SELECT * FROM password_history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(n)
        .fetch_all(pool)
        .await
        .context("failed to fetch password history")
    }

    /// Insert a new entry then delete all but the newest `n` (no-op when
    /// `n <= 0`, per §4.5).
    pub async fn record(
        pool: &PgPool,
        user_id: Uuid,
        realm_id: Uuid,
        password_hash: &str,
        n: i32,
    ) -> Result<()> {
        if n <= 0 {
            return Ok(());
        }

        let mut tx = pool.begin().await.context("failed to start transaction")?;

        sqlx::query(
            "INSERT INTO password_history (user_id, realm_id, password_hash) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(realm_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await
        .context("failed to insert password history")?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = $1 AND created_at NOT IN (
                SELECT created_at FROM password_history
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            )
            "#,
        )
        .bind(user_id)
        .bind(n as i64)
        .execute(&mut *tx)
        .await
        .context("failed to trim password history")?;

        tx.commit().await.context("failed to commit password history update")?;
        Ok(())
    }
}
