//! TOTP credential and recovery-code persistence (spec.md §3).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credential_type: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub algorithm: String,
    pub digits: i32,
    pub period: i32,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub used: bool,
}

impl UserCredential {
    pub async fn find_totp(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, UserCredential>(
            "SELECT * FROM user_credentials WHERE user_id = $1 AND credential_type = 'totp'",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch TOTP credential")
    }

    /// Delete any prior unverified TOTP credential for this user before
    /// starting a new enrollment (§4.9 "Enroll TOTP").
    pub async fn delete_unverified_totp(pool: &PgPool, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "DELETE FROM user_credentials WHERE user_id = $1 AND credential_type = 'totp' AND verified = false",
        )
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to delete unverified TOTP credential")?;
        Ok(())
    }

    pub async fn enroll_totp(
        pool: &PgPool,
        user_id: Uuid,
        secret_key: &str,
        digits: i32,
        period: i32,
    ) -> Result<Self> {
        sqlx::query_as::<_, UserCredential>(
            r#"
            INSERT INTO user_credentials (id, user_id, credential_type, secret_key, algorithm, digits, period, verified)
            VALUES ($1, $2, 'totp', $3, 'SHA1', $4, $5, false)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(secret_key)
        .bind(digits)
        .bind(period)
        .fetch_one(pool)
        .await
        .context("failed to enroll TOTP credential")
    }

    pub async fn mark_verified(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE user_credentials SET verified = true WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to verify TOTP credential")?;
        Ok(())
    }
}

impl RecoveryCode {
    /// Replace all recovery codes for a user with `n` freshly generated
    /// plaintext codes, returning the plaintext (shown once, never again).
    pub async fn regenerate(pool: &PgPool, user_id: Uuid, n: usize) -> Result<Vec<String>> {
        let mut tx = pool.begin().await.context("failed to start transaction")?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("failed to clear old recovery codes")?;

        let mut plaintext = Vec::with_capacity(n);
        for _ in 0..n {
            let code = crypto::generate_secret(5);
            let code_hash = crypto::sha256_hex(&normalize(&code));

            sqlx::query(
                "INSERT INTO recovery_codes (id, user_id, code_hash, used) VALUES ($1, $2, $3, false)",
            )
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(&code_hash)
            .execute(&mut *tx)
            .await
            .context("failed to insert recovery code")?;

            plaintext.push(code);
        }

        tx.commit().await.context("failed to commit recovery code regeneration")?;
        Ok(plaintext)
    }

    /// Normalize (lowercase, strip whitespace), hash, and atomically mark
    /// the first matching unused code as used (§4.9 "VerifyRecoveryCode").
    pub async fn verify_and_consume(pool: &PgPool, user_id: Uuid, code: &str) -> Result<bool> {
        let code_hash = crypto::sha256_hex(&normalize(code));

        let result = sqlx::query(
            r#"
            UPDATE recovery_codes SET used = true
            WHERE id = (
                SELECT id FROM recovery_codes
                WHERE user_id = $1 AND code_hash = $2 AND used = false
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .bind(&code_hash)
        .execute(pool)
        .await
        .context("failed to verify recovery code")?;

        Ok(result.rows_affected() > 0)
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_whitespace_and_case() {
        assert_eq!(normalize("  ABCD-EFGH  "), "abcd-efgh");
    }
}
