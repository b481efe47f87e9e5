//! HMAC-SHA256 verification of Miniflux webhook bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "x-miniflux-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
    #[error("invalid HMAC key")]
    InvalidKey,
}

fn keyed_mac(secret: &[u8], body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(mac)
}

/// Check `signature` (hex, optionally prefixed with `sha256=`) against the
/// HMAC of `body` keyed with `secret`. The comparison is constant-time.
///
/// # Errors
///
/// Returns an error if the signature is absent, not hex, or does not match.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    keyed_mac(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Hex-encoded HMAC-SHA256 of `body`, as Miniflux sends it.
///
/// # Errors
///
/// Returns an error if the key is rejected.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    Ok(hex::encode(keyed_mac(secret, body)?.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"s3cret";
    const BODY: &[u8] = br#"{"event_type":"new_entries"}"#;

    #[test]
    fn test_accepts_valid_signature() {
        let sig = sign(SECRET, BODY).unwrap();
        assert_eq!(verify_signature(SECRET, BODY, Some(&sig)), Ok(()));
        assert_eq!(
            verify_signature(SECRET, BODY, Some(&format!("sha256={sig}"))),
            Ok(())
        );
        assert_eq!(
            verify_signature(SECRET, BODY, Some(&sig.to_uppercase())),
            Ok(())
        );
    }

    #[test]
    fn test_rejects_bad_signatures() {
        let sig = sign(b"other", BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, BODY, Some(&sig)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(SECRET, BODY, None),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(SECRET, BODY, Some("")),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(SECRET, BODY, Some("zz-not-hex")),
            Err(SignatureError::Malformed)
        );
        // Truncated digest
        assert_eq!(
            verify_signature(SECRET, BODY, Some(&sign(SECRET, BODY).unwrap()[..10])),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_body_tampering_detected() {
        let sig = sign(SECRET, BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, b"{}", Some(&sig)),
            Err(SignatureError::Mismatch)
        );
    }
}
