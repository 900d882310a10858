//! Authorization-code store (C17): one-time codes with PKCE, TTL, bound to
//! client + redirect URI.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;

/// Authorization codes are bound to a TTL of at most 10 minutes (§3).
pub const MAX_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorizationCode {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub code: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scope: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    #[allow(clippy::too_many_arguments)]
    pub async fn issue(
        pool: &PgPool,
        client_id: Uuid,
        user_id: Uuid,
        redirect_uri: &str,
        scope: &str,
        nonce: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
    ) -> Result<(String, Self)> {
        let code = crypto::generate_secret(32);

        let record = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            INSERT INTO authorization_codes (
                id, code, client_id, user_id, redirect_uri, scope, nonce,
                code_challenge, code_challenge_method, used, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, NOW() + make_interval(secs => $10))
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&code)
        .bind(client_id)
        .bind(user_id)
        .bind(redirect_uri)
        .bind(scope)
        .bind(nonce)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(MAX_TTL_SECONDS as f64)
        .fetch_one(pool)
        .await
        .context("failed to issue authorization code")?;

        Ok((code, record))
    }

    /// Atomically consume a code: `UPDATE ... SET used = true WHERE used =
    /// false` guard (§5). A zero-row result means a concurrent consumer (or
    /// prior use) already claimed it; the caller must reject.
    pub async fn consume(pool: &PgPool, code: &str) -> Result<Option<Self>> {
        let existing = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(pool)
        .await
        .context("failed to look up authorization code")?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let result = sqlx::query(
            "UPDATE authorization_codes SET used = true WHERE id = $1 AND used = false",
        )
        .bind(existing.id)
        .execute(pool)
        .await
        .context("failed to mark authorization code used")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(existing))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < NOW()")
            .execute(pool)
            .await
            .context("failed to garbage-collect expired authorization codes")?;
        Ok(result.rows_affected())
    }
}
