//! Tamper-evident payload signatures.
//!
//! Header format: `X-Webhook-Signature: t=<unix_secs>,v1=<64-hex>` where the
//! hex is `HMAC_SHA256(secret, "<t>.<body>")`. The timestamp binds the
//! signature to a window so captured requests cannot be replayed later.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Produce the signature header value for a payload at `timestamp`.
#[must_use]
pub fn sign(secret: &str, timestamp: i64, body: &str) -> String {
    let digest = hmac_sha256(secret, &format!("{timestamp}.{body}"));
    format!("t={timestamp},v1={}", hex::encode(digest))
}

fn hmac_sha256(secret: &str, message: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// A parsed `t=...,v1=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub timestamp: i64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside the tolerance window")]
    TimestampOutOfTolerance,
    #[error("signature mismatch")]
    Mismatch,
}

/// Parse a signature header value.
pub fn parse_header(header: &str) -> Result<ParsedSignature, VerifyError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) if signature.len() == 32 => Ok(ParsedSignature {
            timestamp,
            signature,
        }),
        _ => Err(VerifyError::Malformed),
    }
}

/// Consumer-side verification: parse, window-check, recompute, and compare
/// in constant time.
pub fn verify(
    secret: &str,
    header: &str,
    body: &str,
    tolerance_secs: i64,
    now_secs: i64,
) -> Result<(), VerifyError> {
    let parsed = parse_header(header)?;
    if (now_secs - parsed.timestamp).abs() > tolerance_secs {
        return Err(VerifyError::TimestampOutOfTolerance);
    }
    let expected = hmac_sha256(secret, &format!("{}.{}", parsed.timestamp, body));
    if expected.ct_eq(&parsed.signature).into() {
        Ok(())
    } else {
        Err(VerifyError::Mismatch)
    }
}
