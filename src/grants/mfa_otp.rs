//! `mfa_otp` grant (§4.9): second step of the password-grant MFA
//! challenge — trades an `mfa_token` + OTP (or recovery code) for tokens.

use super::{RequestContext, TokenForm, TokenResponse, issue_tokens, require, validate_client};
use crate::error::{AppError, AppResult};
use crate::mfa::{self, ChallengeOutcome};
use crate::models::realm::Realm;
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

pub async fn handle(
    state: &AppState,
    realm: &Realm,
    form: &TokenForm,
    ctx: &RequestContext,
) -> AppResult<TokenResponse> {
    let pool = state.db();

    let client_id = require(form, "client_id")?;
    let client_secret = form.get("client_secret").map(String::as_str);
    let client = validate_client(pool, realm.id, client_id, client_secret, "mfa_otp").await?;

    let mfa_token = require(form, "mfa_token")?;
    let otp = require(form, "otp")?;

    let outcome = mfa::resolve_challenge(pool, mfa_token, async {
        // Look up the challenged user lazily inside the verify future so a
        // malformed/expired token never has to touch the users table.
        let record = crate::models::pending_action::PendingAction::find_by_opaque(pool, mfa_token)
            .await?;
        let Some(record) = record else {
            return Ok(false);
        };
        let data: mfa::ChallengeData = serde_json::from_value(record.data)?;

        if mfa::verify_totp(pool, data.user_id, otp).await? {
            return Ok(true);
        }
        mfa::verify_recovery_code(pool, data.user_id, otp).await
    })
    .await
    .map_err(AppError::Internal)?;

    let data = match outcome {
        ChallengeOutcome::Valid(data) => data,
        ChallengeOutcome::Invalid => {
            return Err(AppError::invalid_grant("invalid mfa_token or otp"));
        }
        ChallengeOutcome::Locked => {
            return Err(AppError::invalid_grant("too many failed MFA attempts; request a new challenge"));
        }
    };

    let user = User::find_by_id(pool, data.user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::invalid_grant("user no longer exists"))?;

    let scope = data
        .oauth_params
        .get("scope")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let session = Session::open(
        pool,
        user.id,
        realm.refresh_token_lifespan as i64,
        ctx.client_ip.as_deref(),
        ctx.user_agent.as_deref(),
    )
    .await
    .map_err(AppError::Internal)?;

    issue_tokens(
        pool,
        &state.config().base_url,
        realm,
        &user,
        &client.client_id,
        session.id,
        scope.as_deref(),
        None,
        None,
        None,
    )
    .await
    .map_err(AppError::Internal)
}
