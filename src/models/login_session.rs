//! Browser SSO login session, separate from the OAuth `Session` so browser
//! logout and token logout are orthogonal (spec.md §3).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub realm_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        realm_id: Uuid,
        ttl_seconds: i64,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(String, Self)> {
        let opaque = crypto::generate_secret(32);
        let token_hash = crypto::sha256_hex(&opaque);

        let record = sqlx::query_as::<_, LoginSession>(
            r#"
            INSERT INTO login_sessions (id, user_id, realm_id, token_hash, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW() + make_interval(secs => $7))
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(realm_id)
        .bind(&token_hash)
        .bind(ip_address)
        .bind(user_agent)
        .bind(ttl_seconds as f64)
        .fetch_one(pool)
        .await
        .context("failed to create login session")?;

        Ok((opaque, record))
    }

    pub async fn find_by_opaque(pool: &PgPool, opaque: &str) -> Result<Option<Self>> {
        let token_hash = crypto::sha256_hex(opaque);
        sqlx::query_as::<_, LoginSession>("SELECT * FROM login_sessions WHERE token_hash = $1")
            .bind(&token_hash)
            .fetch_optional(pool)
            .await
            .context("failed to look up login session")
    }

    pub async fn destroy(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM login_sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to destroy login session")?;
        Ok(())
    }
}
