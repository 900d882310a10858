//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL (brute-force gate, rate limiter).
    pub redis_url: String,

    /// Issuer base URL; realm issuer is `BASE_URL/realms/<name>`.
    pub base_url: String,

    /// Shared secret gating the admin REST surface's `x-admin-api-key` header.
    pub admin_api_key: Option<String>,

    /// Bootstrap admin username, seeded into the default realm on first boot.
    pub admin_user: Option<String>,

    /// Bootstrap admin password.
    pub admin_password: Option<String>,

    /// Rate-limiter window, in seconds.
    pub throttle_ttl: u64,

    /// Rate-limiter request ceiling per window.
    pub throttle_limit: u32,

    /// `development` relaxes the login-flow cookie `Secure` flag.
    pub node_env: String,

    /// SMTP host for email delivery. When None, email is disabled.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_encryption: String,
    pub smtp_from_email: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let admin_api_key = env::var("ADMIN_API_KEY").ok();
        let admin_user = env::var("ADMIN_USER").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        let throttle_ttl = env::var("THROTTLE_TTL")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("THROTTLE_TTL must be a valid u64")?;

        let throttle_limit = env::var("THROTTLE_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("THROTTLE_LIMIT must be a valid u32")?;

        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "production".to_string());

        let smtp_host = env::var("SMTP_HOST").ok();
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .context("SMTP_PORT must be a valid u16")?;
        let smtp_username = env::var("SMTP_USERNAME").ok();
        let smtp_password = env::var("SMTP_PASSWORD").ok();
        let smtp_encryption = env::var("SMTP_ENCRYPTION")
            .unwrap_or_else(|_| "starttls".to_string())
            .to_lowercase();
        let smtp_from_email =
            env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "noreply@localhost".to_string());

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            base_url,
            admin_api_key,
            admin_user,
            admin_password,
            throttle_ttl,
            throttle_limit,
            node_env,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            smtp_encryption,
            smtp_from_email,
        })
    }

    /// `true` when NODE_ENV is anything other than `development`.
    pub fn cookies_secure(&self) -> bool {
        self.node_env != "development"
    }
}
