//! Realm model: the top-level tenant boundary (spec.md §3).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Realm record, including password-policy and brute-force knobs.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Realm {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub enabled: bool,
    pub access_token_lifespan: i32,
    pub refresh_token_lifespan: i32,
    pub offline_token_lifespan: i32,
    pub password_min_length: i32,
    pub password_require_uppercase: bool,
    pub password_require_lowercase: bool,
    pub password_require_digits: bool,
    pub password_require_special: bool,
    pub password_history_count: i32,
    pub password_max_age_days: i32,
    pub brute_force_enabled: bool,
    pub max_login_failures: i32,
    pub lockout_duration: i32,
    pub failure_reset_time: i32,
    pub permanent_lockout_after: i32,
    pub mfa_required: bool,
    pub theme: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Realm {
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Realm>("SELECT * FROM realms WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("failed to fetch realm by name")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Realm>("SELECT * FROM realms WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch realm by id")
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Realm>("SELECT * FROM realms ORDER BY name")
            .fetch_all(pool)
            .await
            .context("failed to list realms")
    }

    /// `iss` claim value for tokens issued in this realm.
    pub fn issuer(&self, base_url: &str) -> String {
        format!("{base_url}/realms/{}", self.name)
    }
}
