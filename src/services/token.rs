//! Bearer token issue and expiry checks.
//!
//! Locally issued tokens are three dot-separated segments: base64 header,
//! base64 JSON claims `{sub, iat, exp, jti}`, and a hex SHA-256 digest over
//! the first two segments plus a demo secret. The digest is never verified;
//! this is not a security boundary.
//!
//! TRADE-OFFS
//! ==========
//! Tokens from a remote endpoint are opaque. Anything that is not a
//! three-segment token with a decodable `exp` claim is treated as
//! non-expiring, so remote tokens stay usable until logout.

use std::fmt::Write;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Claims carried in the middle segment. Every field is optional on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_secs() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Issue a local token for `subject`, valid for `ttl_secs` from `issued_at`.
#[must_use]
pub fn issue_token(subject: &str, issued_at: i64, ttl_secs: i64, secret: &str) -> String {
    let nonce: [u8; 8] = rand::rng().random();
    let claims = TokenClaims {
        sub: Some(subject.to_owned()),
        iat: Some(issued_at),
        exp: Some(issued_at.saturating_add(ttl_secs)),
        jti: Some(bytes_to_hex(&nonce)),
    };
    let payload_json = serde_json::to_string(&claims).unwrap_or_default();

    let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
    let payload = URL_SAFE_NO_PAD.encode(payload_json);
    let signature = sign(&header, &payload, secret);
    format!("{header}.{payload}.{signature}")
}

fn sign(header: &str, payload: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(header.as_bytes());
    hasher.update(b".");
    hasher.update(payload.as_bytes());
    hasher.update(b".");
    hasher.update(secret.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// Decode the claims segment of a three-segment token.
///
/// Returns `None` for other shapes and for segments that are not base64 JSON.
/// Both padded standard and URL-safe unpadded encodings are accepted.
#[must_use]
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(payload))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry of `token` in Unix seconds, if it carries a decodable one.
#[must_use]
pub fn expires_at(token: &str) -> Option<i64> {
    decode_claims(token)?.exp
}

/// Whether `token` is usable at `now`: strictly before its expiry, or always
/// when no expiry can be decoded.
#[must_use]
pub fn is_token_valid_at(token: &str, now: i64) -> bool {
    expires_at(token).is_none_or(|exp| now < exp)
}

#[must_use]
pub fn is_token_valid(token: &str) -> bool {
    is_token_valid_at(token, now_secs())
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
