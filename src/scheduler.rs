//! Ticker-driven scheduler (§9 "Scheduled jobs"): refresh-token GC,
//! authorization-code GC, device-code GC, MFA-challenge sweep, and
//! blacklist sweep, each idempotent and bounded. A single instance owns
//! all of them; a Redis lock keeps a multi-instance deployment from
//! running the same sweep twice in the same tick, grounded on the same
//! `SET NX EX` distributed-lock idiom the kernel's cron service uses.

use std::time::Duration;

use anyhow::Result;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::blacklist::Blacklist;
use crate::mfa;
use crate::models::authorization_code::AuthorizationCode;
use crate::models::device_code::DeviceCode;
use crate::models::refresh_token::RefreshToken;
use crate::state::AppState;

const TICK_INTERVAL_SECONDS: u64 = 60;
const LOCK_KEY: &str = "wardenio:scheduler:lock";
const LOCK_TTL_SECONDS: u64 = 55;

/// Run the sweep loop forever. Intended to be spawned as its own task by
/// `main`; a failed tick is logged and the scheduler keeps ticking.
pub async fn run_forever(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECONDS));

    loop {
        interval.tick().await;

        match acquire_lock(&state).await {
            Ok(true) => run_sweep(&state).await,
            Ok(false) => {
                tracing::debug!("scheduler lock held by another instance, skipping tick");
            }
            Err(e) => warn!(error = %e, "failed to acquire scheduler lock"),
        }
    }
}

async fn acquire_lock(state: &AppState) -> Result<bool> {
    let mut conn = state.redis().get_multiplexed_async_connection().await?;
    let held: bool = redis::cmd("SET")
        .arg(LOCK_KEY)
        .arg(std::process::id().to_string())
        .arg("NX")
        .arg("EX")
        .arg(LOCK_TTL_SECONDS)
        .query_async::<Option<String>>(&mut conn)
        .await
        .map(|v| v.is_some())?;
    Ok(held)
}

async fn run_sweep(state: &AppState) {
    let pool = state.db();

    match RefreshToken::delete_expired(pool).await {
        Ok(n) if n > 0 => info!(deleted = n, "swept expired refresh tokens"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "refresh token sweep failed"),
    }

    match AuthorizationCode::delete_expired(pool).await {
        Ok(n) if n > 0 => info!(deleted = n, "swept expired authorization codes"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "authorization code sweep failed"),
    }

    match DeviceCode::delete_expired(pool).await {
        Ok(n) if n > 0 => info!(deleted = n, "swept expired device codes"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "device code sweep failed"),
    }

    match mfa::sweep_expired_challenges(pool).await {
        Ok(n) if n > 0 => info!(deleted = n, "swept expired MFA challenges"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "MFA challenge sweep failed"),
    }

    let blacklisted = sweep_blacklist(state.blacklist());
    if blacklisted > 0 {
        info!(removed = blacklisted, "swept expired blacklist entries");
    }
}

fn sweep_blacklist(blacklist: &Blacklist) -> usize {
    blacklist.sweep()
}
