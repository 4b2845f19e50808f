//! Webhook Signature Verification
//!
//! Authenticates raw request bodies with HMAC-SHA256 before anything is
//! parsed. The signature must be computed over the exact bytes received;
//! reserializing the JSON changes the byte layout and breaks verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use paysync_core::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature against the raw payload bytes.
///
/// The comparison runs inside `Mac::verify_slice`, which is constant-time.
/// Each failure condition is reported distinctly; callers must reject the
/// delivery before any parsing or side effect occurs.
pub fn verify_signature(
    secret: &[u8],
    payload: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    let signature = hex::decode(signature_hex.trim())
        .map_err(|e| SignatureError::MalformedSignature(e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature)
        .map_err(|_| SignatureError::InvalidSignature)
}
