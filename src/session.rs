//! Browser "login session" cookie layer, backed by Redis.
//!
//! This is the `tower_sessions` cookie jar used by the login HTML flow (an
//! external collaborator per spec.md §1); it is distinct from the OIDC
//! `Session` aggregate in `models::session`, which tracks the authenticated
//! subject for token issuance and is orthogonal to browser logout.

use anyhow::{Context, Result};
use fred::prelude::*;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_redis_store::RedisStore;

/// Default login-session cookie expiry (24 hours), matching the refresh
/// token's default `refreshTokenLifespan` order of magnitude.
pub const DEFAULT_SESSION_EXPIRY_HOURS: i64 = 24;

/// Create the session layer using Redis as the backend.
pub async fn create_session_layer(
    redis_url: &str,
    secure: bool,
) -> Result<SessionManagerLayer<RedisStore<Pool>>> {
    let config = Config::from_url(redis_url).context("failed to parse Redis URL")?;

    let pool = Builder::from_config(config)
        .build_pool(1)
        .context("failed to create Redis pool")?;

    pool.init()
        .await
        .context("failed to connect to Redis for sessions")?;

    let store = RedisStore::new(pool);

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(secure)
        .with_http_only(true)
        .with_same_site(SameSite::Strict)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            DEFAULT_SESSION_EXPIRY_HOURS,
        )));

    Ok(session_layer)
}
