//! MFA engine (C9): TOTP enroll/verify, recovery codes, challenge-token
//! lifecycle.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::models::mfa::{RecoveryCode, UserCredential};
use crate::models::pending_action::PendingAction;

const TOTP_DIGITS: usize = 6;
const TOTP_PERIOD: u64 = 30;
const RECOVERY_CODE_COUNT: usize = 10;
const CHALLENGE_TTL_SECONDS: i64 = 300;
const MAX_CHALLENGE_ATTEMPTS: i64 = 5;

pub struct Enrollment {
    pub secret: String,
    pub qr_data_url: String,
    pub otpauth_url: String,
}

fn build_totp(secret_key: &str, issuer: String, username: String) -> Result<TOTP> {
    let secret = Secret::Encoded(secret_key.to_string())
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("invalid TOTP secret encoding: {e:?}"))?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_PERIOD,
        secret,
        Some(issuer),
        username,
    )
    .context("failed to construct TOTP generator")
}

/// Enroll a new TOTP credential: deletes prior unverified credentials,
/// allocates a 20-byte secret, and builds the otpauth URL + QR code
/// (§4.9 "Enroll TOTP").
pub async fn enroll_totp(
    pool: &PgPool,
    user_id: Uuid,
    username: &str,
    app_name: &str,
    realm_name: &str,
) -> Result<Enrollment> {
    UserCredential::delete_unverified_totp(pool, user_id).await?;

    let secret = Secret::generate_secret();
    let secret_encoded = secret.to_encoded().to_string();

    UserCredential::enroll_totp(
        pool,
        user_id,
        &secret_encoded,
        TOTP_DIGITS as i32,
        TOTP_PERIOD as i32,
    )
    .await?;

    let issuer = format!("{app_name} ({realm_name})");
    let totp = build_totp(&secret_encoded, issuer, username.to_string())?;
    let otpauth_url = totp.get_url();

    let code = QrCode::new(otpauth_url.as_bytes()).context("failed to render QR code")?;
    let svg_xml = code.render::<svg::Color>().build();
    let qr_data_url = format!(
        "data:image/svg+xml;base64,{}",
        BASE64_STANDARD.encode(svg_xml.as_bytes())
    );

    Ok(Enrollment {
        secret: secret_encoded,
        qr_data_url,
        otpauth_url,
    })
}

/// Validate the OTP against the pending (unverified) credential, mark it
/// verified, and regenerate recovery codes. Returns `None` on failure
/// without modifying any state.
pub async fn activate_totp(
    pool: &PgPool,
    user_id: Uuid,
    username: &str,
    otp: &str,
) -> Result<Option<Vec<String>>> {
    let Some(credential) = UserCredential::find_totp(pool, user_id).await? else {
        return Ok(None);
    };
    if credential.verified {
        return Ok(None);
    }

    let totp = build_totp(&credential.secret_key, "wardenio".to_string(), username.to_string())?;
    if !totp.check_current(otp).unwrap_or(false) {
        return Ok(None);
    }

    UserCredential::mark_verified(pool, credential.id).await?;
    let codes = RecoveryCode::regenerate(pool, user_id, RECOVERY_CODE_COUNT).await?;
    Ok(Some(codes))
}

/// Verify an OTP against the user's verified TOTP credential, ±1-period
/// window (handled internally by `check_current`'s window semantics via
/// `totp-rs`'s constant-time comparison).
pub async fn verify_totp(pool: &PgPool, user_id: Uuid, otp: &str) -> Result<bool> {
    let Some(credential) = UserCredential::find_totp(pool, user_id).await? else {
        return Ok(false);
    };
    if !credential.verified {
        return Ok(false);
    }

    let totp = build_totp(&credential.secret_key, "wardenio".to_string(), String::new())?;
    Ok(totp.check_current(otp).unwrap_or(false))
}

pub async fn verify_recovery_code(pool: &PgPool, user_id: Uuid, code: &str) -> Result<bool> {
    RecoveryCode::verify_and_consume(pool, user_id, code).await
}

pub fn is_mfa_enabled_sync(credential: &Option<UserCredential>) -> bool {
    credential.as_ref().is_some_and(|c| c.verified)
}

/// Data carried in an MFA challenge's `PendingAction`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChallengeData {
    pub user_id: Uuid,
    pub realm_id: Uuid,
    pub oauth_params: serde_json::Value,
    #[serde(default)]
    pub attempts: i64,
}

/// Create an opaque challenge token; TTL 5 minutes, single-use (§4.9).
pub async fn create_challenge(
    pool: &PgPool,
    user_id: Uuid,
    realm_id: Uuid,
    oauth_params: serde_json::Value,
) -> Result<String> {
    let data = ChallengeData {
        user_id,
        realm_id,
        oauth_params,
        attempts: 0,
    };
    PendingAction::create(
        pool,
        "mfa_challenge",
        serde_json::to_value(data)?,
        CHALLENGE_TTL_SECONDS,
    )
    .await
}

pub enum ChallengeOutcome {
    Valid(ChallengeData),
    Invalid,
    Locked,
}

/// Retry-aware validator: increments `attempts` on failure and leaves the
/// record alive (TTL unchanged); returns `Locked` once `attempts > 5`.
/// On success the record is consumed (single-use).
pub async fn resolve_challenge(
    pool: &PgPool,
    mfa_token: &str,
    verify: impl std::future::Future<Output = Result<bool>>,
) -> Result<ChallengeOutcome> {
    let Some(record) = PendingAction::find_by_opaque(pool, mfa_token).await? else {
        return Ok(ChallengeOutcome::Invalid);
    };

    let mut data: ChallengeData = serde_json::from_value(record.data.clone())
        .context("malformed MFA challenge data")?;

    if data.attempts > MAX_CHALLENGE_ATTEMPTS {
        return Ok(ChallengeOutcome::Locked);
    }

    if verify.await? {
        PendingAction::delete(pool, mfa_token).await?;
        return Ok(ChallengeOutcome::Valid(data));
    }

    data.attempts += 1;
    if data.attempts > MAX_CHALLENGE_ATTEMPTS {
        PendingAction::update_data(pool, mfa_token, serde_json::to_value(&data)?).await?;
        return Ok(ChallengeOutcome::Locked);
    }

    PendingAction::update_data(pool, mfa_token, serde_json::to_value(&data)?).await?;
    Ok(ChallengeOutcome::Invalid)
}

pub async fn sweep_expired_challenges(pool: &PgPool) -> Result<u64> {
    PendingAction::delete_expired(pool).await
}
