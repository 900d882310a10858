//! User model and CRUD operations.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// User record. `password_hash` is nullable for federated/unset users.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub federation_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// `name` claim: firstName+" "+lastName, falling back to either (§4.3).
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f.clone()),
            (None, Some(l)) => Some(l.clone()),
            (None, None) => None,
        }
    }

    pub async fn find_by_username(
        pool: &PgPool,
        realm_id: Uuid,
        username: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE realm_id = $1 AND username = $2")
            .bind(realm_id)
            .bind(username)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by username")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")
    }

    pub async fn find_by_email(
        pool: &PgPool,
        realm_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE realm_id = $1 AND email = $2")
            .bind(realm_id)
            .bind(email)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by email")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &PgPool,
        realm_id: Uuid,
        username: &str,
        email: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        password_hash: Option<&str>,
        federation_link: Option<&str>,
    ) -> Result<Self> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, realm_id, username, email, email_verified, first_name,
                last_name, enabled, password_hash, password_changed_at, federation_link
            )
            VALUES ($1, $2, $3, $4, false, $5, $6, true, $7, CASE WHEN $7 IS NULL THEN NULL ELSE NOW() END, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(realm_id)
        .bind(username)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(federation_link)
        .fetch_one(pool)
        .await
        .context("failed to create user")
    }

    pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, password_changed_at = NOW() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set password")?;
        Ok(())
    }

    pub async fn lock_until(pool: &PgPool, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET locked_until = $1 WHERE id = $2")
            .bind(until)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to lock user")?;
        Ok(())
    }

    pub async fn link_federated_identity(
        pool: &PgPool,
        id: Uuid,
        federation_link: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET federation_link = $1 WHERE id = $2")
            .bind(federation_link)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to link federated identity")?;
        Ok(())
    }

    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        email: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET email = COALESCE($1, email), first_name = COALESCE($2, first_name), last_name = COALESCE($3, last_name) WHERE id = $4",
        )
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update user profile")?;
        Ok(())
    }
}
