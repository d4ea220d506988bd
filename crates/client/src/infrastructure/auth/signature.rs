//! `IW1-HMAC-SHA256` request signing for the token endpoint.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_SCHEME: &str = "IW1-HMAC-SHA256";
const KEY_PREFIX: &str = "IW1";
const METHOD: &str = "ai.inworld.engine.v1.SessionTokens/GenerateSessionToken";
const REQUEST_TERMINATOR: &str = "iw1_request";
const NONCE_DIGITS: usize = 11;

/// Build the `Authorization` header value for a token request.
pub fn authorization_header(key: &str, secret: &str, host: &str, now: DateTime<Utc>) -> String {
    sign(key, secret, host, &format_datetime(now), &generate_nonce())
}

/// Deterministic signing with an explicit datetime and nonce.
pub fn sign(key: &str, secret: &str, host: &str, datetime: &str, nonce: &str) -> String {
    let signature = signature(secret, &[datetime, host, METHOD, nonce, REQUEST_TERMINATOR]);
    format!(
        "{AUTH_SCHEME} ApiKey={key},DateTime={datetime},Nonce={nonce},Signature={signature}"
    )
}

/// Chain of HMACs: each part is signed with the previous digest as key.
fn signature(secret: &str, parts: &[&str]) -> String {
    let mut key = format!("{KEY_PREFIX}{secret}").into_bytes();
    for part in parts {
        let mut mac =
            HmacSha256::new_from_slice(&key).expect("HMAC accepts keys of any length");
        mac.update(part.as_bytes());
        key = mac.finalize().into_bytes().to_vec();
    }
    hex::encode(key)
}

pub fn format_datetime(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn header_carries_all_fields() {
        let header = sign("key", "secret", "api.test", "20240102030405", "01234567890");
        let rest = header
            .strip_prefix("IW1-HMAC-SHA256 ")
            .expect("scheme prefix");
        let fields: Vec<&str> = rest.split(',').collect();
        assert_eq!(fields[0], "ApiKey=key");
        assert_eq!(fields[1], "DateTime=20240102030405");
        assert_eq!(fields[2], "Nonce=01234567890");

        let signature = fields[3].strip_prefix("Signature=").expect("signature");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn signature_depends_on_every_input() {
        let base = sign("key", "secret", "host", "20240102030405", "00000000000");
        assert_eq!(base, sign("key", "secret", "host", "20240102030405", "00000000000"));
        assert_ne!(base, sign("key", "other", "host", "20240102030405", "00000000000"));
        assert_ne!(base, sign("key", "secret", "other", "20240102030405", "00000000000"));
        assert_ne!(base, sign("key", "secret", "host", "20240102030405", "00000000001"));
    }

    #[test]
    fn datetime_is_compact_utc() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_datetime(now), "20240102030405");
    }

    #[test]
    fn nonce_is_eleven_digits() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 11);
        assert!(nonce.chars().all(|c| c.is_ascii_digit()));
    }
}
