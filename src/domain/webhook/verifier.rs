//! Stripe webhook signature verification.
//!
//! The signature covers `"{t}.{raw body}"`. The body must be the exact bytes
//! received: verifying a re-serialised copy of the parsed JSON would not
//! match. Parsing happens only after the signature checks out.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

use super::{StripeEvent, WebhookError};

/// Default maximum age of a signed event (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Maximum allowed clock skew for events signed in the future.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,

    /// Every `v1` entry; more than one appears while a secret is rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<hex>[,v1=<hex>][,v0=<legacy>]`.
    ///
    /// Unknown schemes, including the legacy `v0`, are skipped.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifier for Stripe webhook signatures.
pub struct StripeWebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Overrides the replay window.
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies against the current time and parses the event.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookError> {
        self.verify_and_parse_at(payload, signature_header, Timestamp::now())
    }

    /// Verifies against `now` and parses the event.
    ///
    /// # Errors
    ///
    /// - `ParseError` - malformed header or JSON body
    /// - `TimestampOutOfRange` - signed longer ago than the tolerance
    /// - `InvalidTimestamp` - signed in the future beyond clock skew
    /// - `InvalidSignature` - no `v1` entry matches
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<StripeEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.validate_timestamp(header.timestamp, now)?;

        let expected = compute_signature(
            self.secret.expose_secret().as_bytes(),
            header.timestamp,
            payload,
        );
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }

        StripeEvent::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    fn validate_timestamp(&self, timestamp: i64, now: Timestamp) -> Result<(), WebhookError> {
        let age = now.as_unix_secs() - timestamp;

        if age > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidTimestamp);
        }
        Ok(())
    }
}

fn compute_signature(secret: &[u8], timestamp: i64, payload: &[u8]) -> Vec<u8> {
    // HMAC is defined for keys of any length, so construction cannot fail.
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a `Stripe-Signature` header value for `payload`.
///
/// Used by test fixtures and local replay tooling.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(compute_signature(secret.as_bytes(), timestamp, payload))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";

    fn verifier() -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_704_067_200).unwrap()
    }

    fn event_json() -> Vec<u8> {
        br#"{"id":"evt_1","type":"payment_intent.succeeded","created":1704067200,"data":{"object":{"id":"pi_1"}},"livemode":false}"#.to_vec()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Header parsing
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_v1_only() {
        let header =
            SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_collects_every_v1_and_skips_v0() {
        let header = SignatureHeader::parse(&format!(
            "t=1,v1={},v1={},v0={}",
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(64)
        ))
        .unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_missing_parts_fails() {
        assert!(matches!(
            SignatureHeader::parse(&format!("v1={}", "a".repeat(64))),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=1234567890"),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=1,v1=zz"),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("garbage"),
            Err(WebhookError::ParseError(_))
        ));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Signature checks
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_parses_event() {
        let payload = event_json();
        let header = sign_payload(TEST_SECRET, now().as_unix_secs(), &payload);

        let event = verifier().verify_and_parse_at(&payload, &header, now()).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = event_json();
        let header = sign_payload("whsec_other", now().as_unix_secs(), &payload);
        assert!(matches!(
            verifier().verify_and_parse_at(&payload, &header, now()),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = event_json();
        let header = sign_payload(TEST_SECRET, now().as_unix_secs(), &payload);
        let tampered = String::from_utf8(payload).unwrap().replace("pi_1", "pi_2");
        assert!(matches!(
            verifier().verify_and_parse_at(tampered.as_bytes(), &header, now()),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn reformatted_json_is_rejected() {
        let payload = event_json();
        let header = sign_payload(TEST_SECRET, now().as_unix_secs(), &payload);
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert!(matches!(
            verifier().verify_and_parse_at(&pretty, &header, now()),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let payload = event_json();
        let ts = now().as_unix_secs();
        let good = sign_payload(TEST_SECRET, ts, &payload);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", ts, "0".repeat(64), good_sig);
        assert!(verifier().verify_and_parse_at(&payload, &header, now()).is_ok());
    }

    #[test]
    fn signature_over_non_utf8_bytes_verifies() {
        let payload = [b"{\"id\":\"evt_1\"}".as_slice(), &[0xff, 0xfe]].concat();
        let header = sign_payload(TEST_SECRET, now().as_unix_secs(), &payload);
        // Signature passes; the body then fails to parse as JSON.
        assert!(matches!(
            verifier().verify_and_parse_at(&payload, &header, now()),
            Err(WebhookError::ParseError(_))
        ));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Replay window
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn timestamp_at_tolerance_boundary_succeeds() {
        let payload = event_json();
        let ts = now().as_unix_secs() - DEFAULT_TOLERANCE_SECS;
        let header = sign_payload(TEST_SECRET, ts, &payload);
        assert!(verifier().verify_and_parse_at(&payload, &header, now()).is_ok());
    }

    #[test]
    fn timestamp_past_tolerance_fails() {
        let payload = event_json();
        let ts = now().as_unix_secs() - DEFAULT_TOLERANCE_SECS - 1;
        let header = sign_payload(TEST_SECRET, ts, &payload);
        assert!(matches!(
            verifier().verify_and_parse_at(&payload, &header, now()),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn timestamp_beyond_future_skew_fails() {
        let payload = event_json();
        let ts = now().as_unix_secs() + MAX_CLOCK_SKEW_SECS + 1;
        let header = sign_payload(TEST_SECRET, ts, &payload);
        assert!(matches!(
            verifier().verify_and_parse_at(&payload, &header, now()),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    #[test]
    fn custom_tolerance_is_honoured() {
        let payload = event_json();
        let ts = now().as_unix_secs() - 100;
        let header = sign_payload(TEST_SECRET, ts, &payload);
        let strict = verifier().with_tolerance(60);
        assert!(matches!(
            strict.verify_and_parse_at(&payload, &header, now()),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn constant_time_compare_rejects_empty_and_mismatched_lengths() {
        assert!(!constant_time_compare(&[], &[]));
        assert!(!constant_time_compare(&[1, 2], &[1, 2, 3]));
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
    }
}
