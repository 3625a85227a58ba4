//! `X-Hub-Signature-256` verification.
//!
//! The header carries `sha256=<hex>`, the HMAC-SHA256 of the raw request
//! body keyed with the shared webhook secret. Verification happens before
//! the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Why a delivery's signature was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Hex digits in a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Decodes the digest from a header value, or `None` if malformed.
///
/// Only the exact form `sha256=` followed by 64 lowercase hex digits is
/// accepted, so the header matches byte for byte what a signer produces.
fn decode_header(header: &str) -> Option<Vec<u8>> {
    let digest = header.strip_prefix(PREFIX)?;
    let canonical = digest.len() == DIGEST_HEX_LEN
        && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return None;
    }
    hex::decode(digest).ok()
}

fn mac(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Checks `header` against the HMAC of `body` in constant time.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let expected = decode_header(header).ok_or(SignatureError::Malformed)?;

    mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Header value a sender with `secret` would attach to `body`.
pub fn signature_header(secret: &[u8], body: &[u8]) -> String {
    format!(
        "{PREFIX}{}",
        hex::encode(mac(secret, body).finalize().into_bytes())
    )
}
