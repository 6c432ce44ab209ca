//! Webhook signature verification.
//!
//! The partner platform signs every webhook delivery with HMAC-SHA256 over the canonical string
//! `"{timestamp}.{raw_body}"`, using the shared webhook secret, and sends the hex digest in the `X-Signature` header
//! (some partner API versions prefix it with `sha256=`). The timestamp rides in `X-Timestamp` as unix seconds.
//!
//! Verification is pure: it never touches the event store, so a forged request costs nothing but the HMAC.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex-encoded HMAC-SHA256 signature for the given timestamp and body.
pub fn calculate_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex_encode(&mac.finalize().into_bytes())
}

/// Verifies a webhook signature.
///
/// Returns false when the timestamp is further than `max_skew` from `now` (replay protection), when the signature is
/// not valid hex, or when the digest does not match. The comparison is constant-time via [`Mac::verify_slice`].
pub fn verify_signature(
    body: &[u8],
    provided: &str,
    timestamp: i64,
    secret: &str,
    max_skew: Duration,
    now: DateTime<Utc>,
) -> bool {
    let event_time = match Utc.timestamp_opt(timestamp, 0).single() {
        Some(t) => t,
        None => return false,
    };
    let skew = now.signed_duration_since(event_time);
    if skew > max_skew || -skew > max_skew {
        return false;
    }
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let expected = match hex_decode(provided) {
        Some(bytes) => bytes,
        None => return false,
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "wh_secret_01";
    const MAX_SKEW: Duration = Duration::minutes(5);

    #[test]
    fn valid_signature_is_accepted() {
        let body = br#"{"metadata":{"event_id":"evt-1"}}"#;
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = calculate_signature(SECRET, ts, body);
        assert!(verify_signature(body, &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn sha256_prefix_is_tolerated() {
        let body = b"payload";
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = format!("sha256={}", calculate_signature(SECRET, ts, body));
        assert!(verify_signature(body, &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = calculate_signature("some_other_secret", ts, body);
        assert!(!verify_signature(body, &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = calculate_signature(SECRET, ts, b"original");
        assert!(!verify_signature(b"tampered", &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn stale_timestamp_is_rejected_even_with_correct_hmac() {
        let body = b"payload";
        let now = Utc::now();
        let ts = (now - Duration::minutes(10)).timestamp();
        let sig = calculate_signature(SECRET, ts, body);
        assert!(!verify_signature(body, &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn future_timestamp_beyond_skew_is_rejected() {
        let body = b"payload";
        let now = Utc::now();
        let ts = (now + Duration::minutes(10)).timestamp();
        let sig = calculate_signature(SECRET, ts, body);
        assert!(!verify_signature(body, &sig, ts, SECRET, MAX_SKEW, now));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let body = b"payload";
        let now = Utc::now();
        let ts = now.timestamp();
        assert!(!verify_signature(body, "not-hex!", ts, SECRET, MAX_SKEW, now));
        assert!(!verify_signature(body, "abc", ts, SECRET, MAX_SKEW, now));
    }
}
