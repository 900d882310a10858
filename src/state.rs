//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::blacklist::Blacklist;
use crate::config::Config;
use crate::db;
use crate::lockout::LockoutGate;
use crate::services::email::EmailService;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: PgPool,
    redis: RedisClient,
    config: Config,
    lockout: LockoutGate,
    blacklist: Blacklist,
    email: Option<EmailService>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let db = db::create_pool(&config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;

        let redis = RedisClient::open(config.redis_url.as_str())
            .context("failed to create Redis client")?;

        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;

        let lockout = LockoutGate::new(redis.clone());
        let blacklist = Blacklist::new();

        let email = match &config.smtp_host {
            Some(host) => Some(
                EmailService::new(
                    host,
                    config.smtp_port,
                    config.smtp_username.as_deref(),
                    config.smtp_password.as_deref(),
                    &config.smtp_encryption,
                    config.smtp_from_email.clone(),
                    config.base_url.clone(),
                )
                .context("failed to construct email service")?,
            ),
            None => None,
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                db,
                redis,
                config,
                lockout,
                blacklist,
                email,
            }),
        })
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn redis(&self) -> &RedisClient {
        &self.inner.redis
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn lockout(&self) -> &LockoutGate {
        &self.inner.lockout
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.inner.blacklist
    }

    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }

    pub async fn redis_healthy(&self) -> bool {
        let Ok(mut conn) = self.inner.redis.get_multiplexed_async_connection().await else {
            return false;
        };

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
