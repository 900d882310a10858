//! Brute-force gate (C8) using Redis, grounded in the teacher's account
//! lockout service but extended with the per-realm knobs spec.md §4.6
//! requires (`maxLoginFailures`, `lockoutDuration`, `failureResetTime`,
//! `permanentLockoutAfter`) and a durable "permanent lockout" flag that
//! outlives any Redis TTL.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::realm::Realm;

/// Brute-force counter state for a single user, persisted in Redis as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GateState {
    failure_count: u32,
    /// Failures since genesis, never reset — feeds `permanentLockoutAfter`.
    cumulative_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    permanent_lockout: bool,
}

#[derive(Debug, Clone)]
pub struct LockStatus {
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct LockoutGate {
    redis: RedisClient,
}

impl LockoutGate {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(user_id: Uuid) -> String {
        format!("lockout:state:{user_id}")
    }

    async fn load(&self, user_id: Uuid) -> Result<GateState> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let raw: Option<String> = conn
            .get(Self::key(user_id))
            .await
            .context("failed to load lockout state")?;

        Ok(match raw {
            Some(s) => serde_json::from_str(&s).unwrap_or_default(),
            None => GateState::default(),
        })
    }

    async fn save(&self, user_id: Uuid, state: &GateState) -> Result<()> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let json = serde_json::to_string(state).context("failed to serialize lockout state")?;
        // No TTL: permanent-lockout flags and failure history must survive
        // beyond any single lockout window.
        let _: () = conn
            .set(Self::key(user_id), json)
            .await
            .context("failed to persist lockout state")?;
        Ok(())
    }

    /// Consult current lock status without mutating state. The gate runs
    /// before password verification to avoid an authentication oracle.
    pub async fn check_locked(&self, user_id: Uuid) -> Result<LockStatus> {
        let state = self.load(user_id).await?;
        if state.permanent_lockout {
            return Ok(LockStatus {
                locked: true,
                locked_until: None,
            });
        }
        let locked = state
            .locked_until
            .map(|until| until > Utc::now())
            .unwrap_or(false);
        Ok(LockStatus {
            locked,
            locked_until: if locked { state.locked_until } else { None },
        })
    }

    /// Record a failed password attempt per the §4.6 transition rules.
    pub async fn record_failure(&self, realm: &Realm, user_id: Uuid) -> Result<()> {
        if !realm.brute_force_enabled {
            return Ok(());
        }

        let mut state = self.load(user_id).await?;
        let now = Utc::now();

        let reset_elapsed = state
            .last_failure_at
            .map(|last| (now - last).num_seconds() > realm.failure_reset_time as i64)
            .unwrap_or(true);

        if reset_elapsed {
            state.failure_count = 1;
        } else {
            state.failure_count += 1;
        }
        state.cumulative_failures += 1;
        state.last_failure_at = Some(now);

        if state.failure_count >= realm.max_login_failures as u32 {
            state.locked_until = Some(now + chrono::Duration::seconds(realm.lockout_duration as i64));
        }

        if realm.permanent_lockout_after > 0
            && state.cumulative_failures >= realm.permanent_lockout_after as u32
        {
            state.permanent_lockout = true;
        }

        self.save(user_id, &state).await
    }

    /// Clear the transient failure counter on success. Permanent lockout,
    /// if set, is not cleared here (requires an explicit admin action).
    pub async fn reset_failures(&self, user_id: Uuid) -> Result<()> {
        let mut state = self.load(user_id).await?;
        state.failure_count = 0;
        state.locked_until = None;
        self.save(user_id, &state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(max_failures: i32, reset_secs: i32, lockout_secs: i32, permanent_after: i32) -> Realm {
        Realm {
            id: Uuid::nil(),
            name: "test".to_string(),
            display_name: None,
            enabled: true,
            access_token_lifespan: 300,
            refresh_token_lifespan: 1800,
            offline_token_lifespan: 2_592_000,
            password_min_length: 8,
            password_require_uppercase: false,
            password_require_lowercase: false,
            password_require_digits: false,
            password_require_special: false,
            password_history_count: 0,
            password_max_age_days: 0,
            brute_force_enabled: true,
            max_login_failures: max_failures,
            lockout_duration: lockout_secs,
            failure_reset_time: reset_secs,
            permanent_lockout_after: permanent_after,
            mfa_required: false,
            theme: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn gate_state_defaults_unlocked() {
        let state = GateState::default();
        assert_eq!(state.failure_count, 0);
        assert!(!state.permanent_lockout);
    }

    #[test]
    fn realm_fixture_roundtrips_fields() {
        let r = realm(5, 900, 900, 0);
        assert_eq!(r.max_login_failures, 5);
        assert_eq!(r.failure_reset_time, 900);
    }
}
