//! Webhook signature verification.
//!
//! The backend signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends the
//! hex digest in `X-Voice-Signature` next to the unix timestamp in
//! `X-Voice-Timestamp`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

pub const SIGNATURE_HEADER: &str = "X-Voice-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Voice-Timestamp";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("timestamp is not a unix time")]
    InvalidTimestamp,
    #[error("timestamp is outside the accepted window")]
    Expired,
    #[error("signature is not valid hex")]
    InvalidEncoding,
    #[error("signature does not match")]
    Mismatch,
    #[error("signing secret is not a usable HMAC key")]
    InvalidKey,
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = new_mac(secret, timestamp)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn new_mac(secret: &[u8], timestamp: &str) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    Ok(mac)
}

/// Checks a webhook delivery against `secret`.
///
/// `now` is the current unix time in seconds; deliveries whose timestamp is
/// further than `tolerance` from it are rejected. The digest comparison is
/// constant-time.
pub fn verify(
    secret: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    now: i64,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;
    let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;

    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(sent_at) > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }

    let provided = hex::decode(signature.trim()).map_err(|_| SignatureError::InvalidEncoding)?;
    let mut mac = new_mac(secret, timestamp)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";
    const BODY: &[u8] = br#"{"type":"incoming-call","call":{"callId":"c1"}}"#;
    const TOLERANCE: Duration = Duration::from_secs(300);

    #[test]
    fn test_valid_signature() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(
            verify(SECRET, Some(&signature), Some("1700000000"), BODY, 1_700_000_100, TOLERANCE),
            Ok(())
        );
    }

    #[test]
    fn test_tampered_body_or_wrong_secret() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        assert_eq!(
            verify(SECRET, Some(&signature), Some("1700000000"), b"{}", 1_700_000_000, TOLERANCE),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(b"other", Some(&signature), Some("1700000000"), BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::Mismatch)
        );
        // A signature for another timestamp does not carry over.
        assert_eq!(
            verify(SECRET, Some(&signature), Some("1700000001"), BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_replayed_delivery_outside_window() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        assert_eq!(
            verify(SECRET, Some(&signature), Some("1700000000"), BODY, 1_700_000_301, TOLERANCE),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify(SECRET, Some(&signature), Some("1700000000"), BODY, 1_699_999_600, TOLERANCE),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            verify(SECRET, None, Some("1700000000"), BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::MissingHeader(SIGNATURE_HEADER))
        );
        assert_eq!(
            verify(SECRET, Some("abcd"), None, BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
        assert_eq!(
            verify(SECRET, Some("abcd"), Some("yesterday"), BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::InvalidTimestamp)
        );
        assert_eq!(
            verify(SECRET, Some("zz"), Some("1700000000"), BODY, 1_700_000_000, TOLERANCE),
            Err(SignatureError::InvalidEncoding)
        );
    }
}
