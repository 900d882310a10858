//! Key store (C3): active signing key lookup per realm, rotation contract.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jwt;
use crate::models::signing_key::SigningKey;

/// Returned when a realm has no active signing key — callers should treat
/// this as a 500-class condition (a realm must always have one after setup).
#[derive(Debug, thiserror::Error)]
#[error("no active signing key for realm")]
pub struct NoActiveSigningKey;

/// Fetch the active signing key for a realm, generating and persisting one
/// if none exists yet (first-boot bootstrap for a freshly created realm).
pub async fn active_key(pool: &PgPool, realm_id: Uuid) -> Result<SigningKey> {
    if let Some(key) = SigningKey::active_for_realm(pool, realm_id).await? {
        return Ok(key);
    }
    generate_and_activate(pool, realm_id).await
}

/// Generate a fresh RSA keypair and make it the realm's active signing key,
/// deactivating (not deleting) the previous one.
pub async fn generate_and_activate(pool: &PgPool, realm_id: Uuid) -> Result<SigningKey> {
    let pair = jwt::generate_rsa_key_pair().context("failed to generate signing key")?;
    SigningKey::rotate(pool, realm_id, &pair.kid, &pair.public_pem, &pair.private_pem).await
}

/// All keys to publish in the JWKS document: the active key plus any
/// retired keys still awaiting admin deletion (spec.md §3 SigningKey
/// invariant — no auto-expiry).
pub async fn jwks(pool: &PgPool, realm_id: Uuid) -> Result<Vec<jwt::Jwk>> {
    let keys = SigningKey::all_for_realm(pool, realm_id).await?;
    keys.iter()
        .map(|k| jwt::public_key_to_jwk(&k.public_key, &k.kid))
        .collect()
}

/// Verify a compact JWT against the signing key named by its `kid` header,
/// scoped to `realm_id` so a token minted in one realm never verifies
/// against another realm's key (spec.md §8 invariant 7). Falls back to the
/// realm's active key when the token carries no `kid`.
pub async fn verify_in_realm(pool: &PgPool, realm_id: Uuid, compact: &str) -> Result<Value> {
    let key = match jwt::peek_kid(compact)? {
        Some(kid) => SigningKey::find_by_kid(pool, realm_id, &kid)
            .await?
            .context("signing key named in token not found for this realm")?,
        None => active_key(pool, realm_id).await?,
    };
    jwt::verify_jwt(compact, &key.public_key)
}
