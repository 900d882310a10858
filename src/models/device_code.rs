//! Device-code flow (C18): user-code binding, polling-interval enforcement.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;

const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ0123456789";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceCode {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub device_code: String,
    pub user_code: String,
    pub realm_id: Uuid,
    pub client_id: Uuid,
    pub scope: String,
    pub interval: i32,
    pub expires_at: DateTime<Utc>,
    pub approved: bool,
    pub denied: bool,
    pub user_id: Option<Uuid>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

/// Human-readable user code, e.g. `WDJB-MJHT` (RFC 8628 §6.1 style).
fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    let chars: String = (0..8)
        .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", &chars[0..4], &chars[4..8])
}

impl DeviceCode {
    pub async fn issue(
        pool: &PgPool,
        realm_id: Uuid,
        client_id: Uuid,
        scope: &str,
        interval_seconds: i32,
        ttl_seconds: i64,
    ) -> Result<(String, Self)> {
        let device_code = crypto::generate_secret(32);
        let user_code = generate_user_code();

        let record = sqlx::query_as::<_, DeviceCode>(
            r#"
            INSERT INTO device_codes (
                id, device_code, user_code, realm_id, client_id, scope,
                interval, expires_at, approved, denied
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW() + make_interval(secs => $8), false, false)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&device_code)
        .bind(&user_code)
        .bind(realm_id)
        .bind(client_id)
        .bind(scope)
        .bind(interval_seconds)
        .bind(ttl_seconds as f64)
        .fetch_one(pool)
        .await
        .context("failed to issue device code")?;

        Ok((device_code, record))
    }

    pub async fn find_by_device_code(
        pool: &PgPool,
        realm_id: Uuid,
        device_code: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, DeviceCode>(
            "SELECT * FROM device_codes WHERE realm_id = $1 AND device_code = $2",
        )
        .bind(realm_id)
        .bind(device_code)
        .fetch_optional(pool)
        .await
        .context("failed to fetch device code")
    }

    pub async fn find_by_user_code(pool: &PgPool, user_code: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, DeviceCode>(
            "SELECT * FROM device_codes WHERE user_code = $1",
        )
        .bind(user_code)
        .fetch_optional(pool)
        .await
        .context("failed to fetch device code by user code")
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Unconditionally stamp `last_polled_at` before the caller computes
    /// `slow_down`, so attacker-driven clock skew cannot starve a
    /// legitimate poller (§5).
    pub async fn touch_polled(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE device_codes SET last_polled_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update device code poll timestamp")?;
        Ok(())
    }

    pub async fn approve(pool: &PgPool, user_code: &str, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE device_codes SET approved = true, user_id = $1 WHERE user_code = $2 AND approved = false AND denied = false",
        )
        .bind(user_id)
        .bind(user_code)
        .execute(pool)
        .await
        .context("failed to approve device code")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deny(pool: &PgPool, user_code: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE device_codes SET denied = true WHERE user_code = $1 AND approved = false",
        )
        .bind(user_code)
        .execute(pool)
        .await
        .context("failed to deny device code")?;
        Ok(result.rows_affected() > 0)
    }

    /// Consumption deletes the record on successful token issuance (§4.14).
    pub async fn consume(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM device_codes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to consume device code")?;
        Ok(())
    }

    pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM device_codes WHERE expires_at < NOW()")
            .execute(pool)
            .await
            .context("failed to garbage-collect expired device codes")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_code_format() {
        let code = generate_user_code();
        assert_eq!(code.len(), 9);
        assert_eq!(code.chars().nth(4), Some('-'));
    }
}
