//! Crypto primitives (C1): password hashing, random secrets, SHA-256.

use anyhow::{Context, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Argon2id parameters per spec.md §4.1: memoryCost=65536 KiB, timeCost=3,
/// parallelism=4.
fn argon2() -> Argon2<'static> {
    let params = Params::new(65536, 3, 4, None).expect("static argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a password with Argon2id. Fatal only if Argon2 itself rejects the
/// input (e.g. absurd length); never fails on weak passwords — that's C7's job.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2id hash, constant-time.
/// Returns `Ok(false)` (not an error) on mismatch; only a malformed hash
/// string is an error.
pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).context("malformed password hash")?;
    Ok(argon2()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate `n_bytes` of cryptographically random data, hex-encoded.
pub fn generate_secret(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// SHA-256 of `s`, hex-encoded.
pub fn sha256_hex(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)
}

/// PKCE S256 check (RFC 7636 §4.6): does `base64url(sha256(verifier))` equal
/// `challenge`? Compared in constant time since both values travel over the
/// token endpoint and a timing leak would narrow a brute-force search.
pub fn pkce_s256_matches(verifier: &str, challenge: &str) -> bool {
    let digest = Sha256::digest(verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(digest);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password(&hash, "correct horse battery staple").unwrap());
        assert!(!verify_password(&hash, "wrong password").unwrap());
    }

    #[test]
    fn malformed_hash_is_error() {
        assert!(verify_password("not-a-hash", "anything").is_err());
    }

    #[test]
    fn secret_is_requested_length() {
        assert_eq!(generate_secret(32).len(), 64);
        assert_ne!(generate_secret(32), generate_secret(32));
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }
}
