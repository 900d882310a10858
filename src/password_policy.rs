//! Password policy (C7): strength validation, history, expiry.

use chrono::Utc;
use regex::Regex;
use sqlx::PgPool;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::crypto;
use crate::models::password_history::PasswordHistory;
use crate::models::realm::Realm;
use crate::models::user::User;

static UPPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Lu}").unwrap());
static LOWER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Ll}").unwrap());
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Nd}").unwrap());
static SPECIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").unwrap());

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Aggregate every violation; never short-circuits (§4.5).
pub fn validate(realm: &Realm, password: &str) -> ValidationResult {
    let mut errors = Vec::new();

    if password.chars().count() < realm.password_min_length as usize {
        errors.push(format!(
            "password must be at least {} characters",
            realm.password_min_length
        ));
    }
    if realm.password_require_uppercase && !UPPER.is_match(password) {
        errors.push("password must contain an uppercase letter".to_string());
    }
    if realm.password_require_lowercase && !LOWER.is_match(password) {
        errors.push("password must contain a lowercase letter".to_string());
    }
    if realm.password_require_digits && !DIGIT.is_match(password) {
        errors.push("password must contain a digit".to_string());
    }
    if realm.password_require_special && !SPECIAL.is_match(password) {
        errors.push("password must contain a special character".to_string());
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

/// Verify the candidate against the newest `n` history hashes; `n <= 0`
/// means history is disabled.
pub async fn check_history(
    pool: &PgPool,
    user_id: Uuid,
    password: &str,
    n: i32,
) -> anyhow::Result<bool> {
    if n <= 0 {
        return Ok(false);
    }

    for entry in PasswordHistory::newest(pool, user_id, n as i64).await? {
        if crypto::verify_password(&entry.password_hash, password).unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub async fn record_history(
    pool: &PgPool,
    user_id: Uuid,
    realm_id: Uuid,
    hash: &str,
    n: i32,
) -> anyhow::Result<()> {
    PasswordHistory::record(pool, user_id, realm_id, hash, n).await
}

/// `false` if `passwordMaxAgeDays <= 0`; `true` if `passwordChangedAt` is
/// null; else compares elapsed time to the max age.
pub fn is_expired(user: &User, realm: &Realm) -> bool {
    if realm.password_max_age_days <= 0 {
        return false;
    }
    let Some(changed_at) = user.password_changed_at else {
        return true;
    };
    let age = Utc::now() - changed_at;
    age.num_days() > realm.password_max_age_days as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(min_len: i32, upper: bool, lower: bool, digits: bool, special: bool) -> Realm {
        Realm {
            id: Uuid::nil(),
            name: "test".to_string(),
            display_name: None,
            enabled: true,
            access_token_lifespan: 300,
            refresh_token_lifespan: 1800,
            offline_token_lifespan: 2_592_000,
            password_min_length: min_len,
            password_require_uppercase: upper,
            password_require_lowercase: lower,
            password_require_digits: digits,
            password_require_special: special,
            password_history_count: 0,
            password_max_age_days: 0,
            brute_force_enabled: true,
            max_login_failures: 5,
            lockout_duration: 900,
            failure_reset_time: 900,
            permanent_lockout_after: 0,
            mfa_required: false,
            theme: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn validate_aggregates_all_violations() {
        let realm = realm(12, true, true, true, true);
        let result = validate(&realm, "abc");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 4); // length, upper, digit, special (has lower)
    }

    #[test]
    fn validate_accepts_strong_password() {
        let realm = realm(8, true, true, true, true);
        let result = validate(&realm, "Str0ng!Pass");
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn unicode_aware_class_checks() {
        let realm = realm(1, true, false, false, false);
        assert!(validate(&realm, "Ü").valid);
    }

    #[test]
    fn is_expired_false_when_max_age_disabled() {
        let realm = realm(8, false, false, false, false);
        let user = User {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            username: "u".to_string(),
            email: None,
            email_verified: false,
            first_name: None,
            last_name: None,
            enabled: true,
            password_hash: None,
            password_changed_at: None,
            locked_until: None,
            federation_link: None,
            created_at: Utc::now(),
        };
        assert!(!is_expired(&user, &realm));
    }

    #[test]
    fn is_expired_true_when_never_changed_and_max_age_enabled() {
        let mut realm = realm(8, false, false, false, false);
        realm.password_max_age_days = 90;
        let user = User {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            username: "u".to_string(),
            email: None,
            email_verified: false,
            first_name: None,
            last_name: None,
            enabled: true,
            password_hash: None,
            password_changed_at: None,
            locked_until: None,
            federation_link: None,
            created_at: Utc::now(),
        };
        assert!(is_expired(&user, &realm));
    }
}
