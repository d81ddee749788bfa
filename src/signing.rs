//! HMAC request signing for server-side ingest.
//!
//! Signed ingest requests carry three headers (`x-ts-timestamp`,
//! `x-ts-nonce`, `x-ts-signature`) where the signature is an HMAC-SHA256 over
//! `"{timestamp}.{nonce}.{payload}"` keyed by a shared secret, hex-encoded.
//! Signing is deterministic in its inputs: the same (secret, timestamp,
//! nonce, payload) always yields the same signature.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised when a signature cannot be computed.
///
/// Raised before any network call; a request is never sent half-signed.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing requested but the secret is empty")]
    MissingSecret,

    #[error("signing key rejected by the MAC implementation")]
    InvalidKey,
}

/// A computed signature together with the inputs a verifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Unix seconds, as sent in `x-ts-timestamp`.
    pub timestamp: String,
    /// Random nonce, as sent in `x-ts-nonce`.
    pub nonce: String,
    /// Hex-encoded HMAC-SHA256, as sent in `x-ts-signature`.
    pub signature: String,
}

/// Compute the signature for explicit inputs.
pub fn sign(
    secret: &str,
    timestamp: &str,
    nonce: &str,
    payload: &str,
) -> Result<String, SigningError> {
    if secret.is_empty() {
        return Err(SigningError::MissingSecret);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKey)?;
    mac.update(format!("{timestamp}.{nonce}.{payload}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sign a payload with a fresh timestamp and nonce.
pub fn sign_now(secret: &str, payload: &str) -> Result<Signature, SigningError> {
    let timestamp = Utc::now().timestamp().to_string();
    let nonce = Uuid::new_v4().simple().to_string()[..8].to_string();
    let signature = sign(secret, &timestamp, &nonce, payload)?;
    Ok(Signature {
        timestamp,
        nonce,
        signature,
    })
}
