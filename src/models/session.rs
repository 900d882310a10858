//! OIDC Session: created on successful subject auth, destroyed on logout or
//! explicit revocation. Distinct from the browser `LoginSession` cookie.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub async fn open(
        pool: &PgPool,
        user_id: Uuid,
        ttl_seconds: i64,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5))
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(ip_address)
        .bind(user_agent)
        .bind(ttl_seconds as f64)
        .fetch_one(pool)
        .await
        .context("failed to open session")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch session")
    }

    /// A token issued against a closed (or expired) session must be
    /// rejected at introspection (§4.14 state machine).
    pub fn is_open(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// Records the scope of the session's first token issuance (§4.9: a
    /// later `refresh_token` grant without an explicit `scope` falls back to
    /// "the original grant's scope"). A no-op past the first call so later,
    /// possibly narrower, refreshes never overwrite it.
    pub async fn set_scope(pool: &PgPool, id: Uuid, scope: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET scope = $1 WHERE id = $2 AND scope IS NULL")
            .bind(scope)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to set session scope")?;
        Ok(())
    }

    pub async fn close(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to close session")?;
        Ok(())
    }
}
