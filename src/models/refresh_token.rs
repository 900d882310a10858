//! Refresh-token store (C10): hash-indexed rotation log with reuse
//! detection. Tokens are opaque 64-byte random strings; only their SHA-256
//! hash is ever persisted (spec.md §6 "Persisted state").

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub is_offline: bool,
}

/// Outcome of a rotation attempt.
pub enum RotationResult {
    /// Rotation succeeded; carries the new opaque secret and its record.
    Rotated {
        opaque: String,
        record: RefreshToken,
    },
    /// The token was unknown, expired, or already revoked. A revoked hit
    /// additionally poisons the whole session (reuse detection).
    Rejected,
}

impl RefreshToken {
    /// Generate a fresh opaque secret and persist its hash.
    pub async fn issue(
        pool: &PgPool,
        session_id: Uuid,
        ttl_seconds: i64,
        is_offline: bool,
    ) -> Result<(String, Self)> {
        let opaque = crypto::generate_secret(64);
        let token_hash = crypto::sha256_hex(&opaque);

        let record = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, session_id, token_hash, expires_at, revoked, is_offline)
            VALUES ($1, $2, $3, NOW() + make_interval(secs => $4), false, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(session_id)
        .bind(&token_hash)
        .bind(ttl_seconds as f64)
        .bind(is_offline)
        .fetch_one(pool)
        .await
        .context("failed to issue refresh token")?;

        Ok((opaque, record))
    }

    /// Atomically rotate the token presented as `opaque`. Implements the
    /// compare-and-set described in spec.md §5: an `UPDATE ... WHERE
    /// revoked = false` guard whose affected-row count decides the path.
    /// A hit on an already-revoked row triggers session-wide revocation
    /// (reuse detection, §4.8/§8 invariant 2).
    pub async fn rotate(
        pool: &PgPool,
        opaque: &str,
        new_ttl_seconds: i64,
    ) -> Result<RotationResult> {
        let token_hash = crypto::sha256_hex(opaque);

        let mut tx = pool.begin().await.context("failed to start rotation transaction")?;

        let existing = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to look up refresh token")?;

        let Some(existing) = existing else {
            tx.commit().await.ok();
            return Ok(RotationResult::Rejected);
        };

        if existing.expires_at <= Utc::now() {
            tx.commit().await.ok();
            return Ok(RotationResult::Rejected);
        }

        if existing.revoked {
            // Reuse of a revoked token: poison the whole session.
            sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE session_id = $1")
                .bind(existing.session_id)
                .execute(&mut *tx)
                .await
                .context("failed to poison session on refresh-token reuse")?;
            tx.commit().await.context("failed to commit reuse-detection revocation")?;
            return Ok(RotationResult::Rejected);
        }

        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE id = $1 AND revoked = false",
        )
        .bind(existing.id)
        .execute(&mut *tx)
        .await
        .context("failed to revoke rotated token")?;

        if result.rows_affected() == 0 {
            // Lost the race to a concurrent rotation/revocation.
            tx.commit().await.ok();
            return Ok(RotationResult::Rejected);
        }

        let new_opaque = crypto::generate_secret(64);
        let new_hash = crypto::sha256_hex(&new_opaque);

        let record = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, session_id, token_hash, expires_at, revoked, is_offline)
            VALUES ($1, $2, $3, NOW() + make_interval(secs => $4), false, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(existing.session_id)
        .bind(&new_hash)
        .bind(new_ttl_seconds as f64)
        .bind(existing.is_offline)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert rotated refresh token")?;

        tx.commit().await.context("failed to commit refresh-token rotation")?;

        Ok(RotationResult::Rotated {
            opaque: new_opaque,
            record,
        })
    }

    pub async fn find_by_opaque(pool: &PgPool, opaque: &str) -> Result<Option<Self>> {
        let token_hash = crypto::sha256_hex(opaque);
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_hash = $1")
            .bind(&token_hash)
            .fetch_optional(pool)
            .await
            .context("failed to look up refresh token")
    }

    /// Revoke every token in a session (logout, explicit revoke).
    pub async fn revoke_session(pool: &PgPool, session_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE session_id = $1")
            .bind(session_id)
            .execute(pool)
            .await
            .context("failed to revoke session refresh tokens")?;
        Ok(())
    }

    /// GC pass: hard-delete tokens past their expiry (scheduler job).
    pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(pool)
            .await
            .context("failed to garbage-collect expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}
