//! Signed, timestamped URLs (capability tokens without server-side state).
//!
//! A signed URL carries its own proof of origin:
//!
//! ```text
//! https://example.com/activate?email=a@b.com&hash=1700000000.9f86d0...
//! └──────────────── payload ──────────────┘    └ issued ┘ └ HMAC-SHA256 ┘
//! ```
//!
//! The signature covers everything before the final `.`, i.e. the payload,
//! the delimiter, the `hash=` field name and the issue timestamp. Validity is
//! purely a function of the key and the clock, so tokens cannot be revoked
//! individually; callers pair verification with a server-side check (for
//! example, "is this account already active?") where that matters.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Query field that introduces the timestamp and signature.
const SIGNATURE_FIELD: &str = "hash=";
/// Separates the signed part from the hex signature.
const SIGNATURE_SEPARATOR: char = '.';
/// Hex length of an HMAC-SHA256 tag.
const SIGNATURE_HEX_LEN: usize = 64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

/// Process-wide signing secret.
///
/// Built once by the composition root and moved into a [`TokenSigner`]; there
/// is no setter, so the key cannot change underneath issued tokens.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Per-use-case token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// How long an account activation link stays usable.
    pub activation_max_age: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            activation_max_age: Duration::minutes(60),
        }
    }
}

/// Signs and verifies URLs with a fixed [`SigningKey`].
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Sign `payload` with the current time as the issue timestamp.
    pub fn sign(&self, payload: &str) -> String {
        self.sign_at(payload, Utc::now())
    }

    /// Sign `payload` with an explicit issue timestamp (second precision).
    ///
    /// Appends `&hash=` when the payload already has a query string and
    /// `?hash=` otherwise, so the result is still a well-formed URL.
    pub fn sign_at(&self, payload: &str, issued_at: DateTime<Utc>) -> String {
        let delimiter = if payload.contains('?') { '&' } else { '?' };
        let mut signed = format!(
            "{payload}{delimiter}{SIGNATURE_FIELD}{}",
            issued_at.timestamp()
        );

        let tag = self.tag(signed.as_bytes());
        signed.push(SIGNATURE_SEPARATOR);
        signed.push_str(&hex::encode(tag));
        signed
    }

    /// `true` only if the signature matches under this signer's key.
    ///
    /// Malformed input, a foreign key and tampering are indistinguishable here.
    /// Expiry is a separate check, see [`TokenSigner::is_expired`].
    pub fn verify(&self, signed: &str) -> bool {
        self.unsign(signed).is_ok()
    }

    /// Verify the signature and return the original payload.
    pub fn unsign<'a>(&self, signed: &'a str) -> Result<&'a str, TokenError> {
        let parts = SignedParts::parse(signed)?;
        let expected = decode_signature(parts.signature)?;
        let actual = self.tag(parts.signed.as_bytes());

        if bool::from(actual.as_slice().ct_eq(expected.as_slice())) {
            Ok(parts.payload)
        } else {
            tracing::debug!("rejected signed url with mismatching signature");
            Err(TokenError::BadSignature)
        }
    }

    /// `true` if more than `max_age` has passed since the token was issued.
    ///
    /// Tokens without a readable timestamp count as expired.
    pub fn is_expired(&self, signed: &str, max_age: Duration) -> bool {
        self.is_expired_at(signed, max_age, Utc::now())
    }

    pub fn is_expired_at(&self, signed: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
        match issued_at(signed) {
            Some(issued) => now - issued > max_age,
            None => true,
        }
    }

    /// Signature and expiry in one call; returns the payload on success.
    pub fn check<'a>(&self, signed: &'a str, max_age: Duration) -> Result<&'a str, TokenError> {
        self.check_at(signed, max_age, Utc::now())
    }

    pub fn check_at<'a>(
        &self,
        signed: &'a str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<&'a str, TokenError> {
        let payload = self.unsign(signed)?;
        if self.is_expired_at(signed, max_age, now) {
            return Err(TokenError::Expired);
        }
        Ok(payload)
    }

    fn tag(&self, message: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length; `new_from_slice` cannot fail here.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.as_bytes())
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Issue timestamp embedded in a signed URL, without checking the signature.
pub fn issued_at(signed: &str) -> Option<DateTime<Utc>> {
    let parts = SignedParts::parse(signed).ok()?;
    Utc.timestamp_opt(parts.issued_at, 0).single()
}

/// Borrowed view over the pieces of a signed URL.
#[derive(Debug)]
struct SignedParts<'a> {
    /// Everything the signature covers.
    signed: &'a str,
    payload: &'a str,
    issued_at: i64,
    signature: &'a str,
}

impl<'a> SignedParts<'a> {
    fn parse(input: &'a str) -> Result<Self, TokenError> {
        let (signed, signature) = input
            .rsplit_once(SIGNATURE_SEPARATOR)
            .ok_or(TokenError::Malformed)?;

        let field_at = signed.rfind(SIGNATURE_FIELD).ok_or(TokenError::Malformed)?;
        let delimiter_at = field_at.checked_sub(1).ok_or(TokenError::Malformed)?;

        // Check the byte before slicing: only an ASCII delimiter guarantees
        // `delimiter_at` is a char boundary.
        let delimiter = *signed
            .as_bytes()
            .get(delimiter_at)
            .ok_or(TokenError::Malformed)?;
        if delimiter != b'?' && delimiter != b'&' {
            return Err(TokenError::Malformed);
        }
        let payload = signed.get(..delimiter_at).ok_or(TokenError::Malformed)?;

        // The delimiter must be the one `sign_at` would have picked.
        let expected_delimiter = if payload.contains('?') { b'&' } else { b'?' };
        if delimiter != expected_delimiter {
            return Err(TokenError::Malformed);
        }

        let timestamp = &signed[field_at + SIGNATURE_FIELD.len()..];
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::Malformed);
        }
        let issued_at = timestamp.parse::<i64>().map_err(|_| TokenError::Malformed)?;

        Ok(Self {
            signed,
            payload,
            issued_at,
            signature,
        })
    }
}

fn decode_signature(signature: &str) -> Result<Vec<u8>, TokenError> {
    // Lowercase only: accepting both cases would let a one-bit case flip
    // produce a second valid encoding of the same signature.
    if signature.len() != SIGNATURE_HEX_LEN
        || !signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(TokenError::Malformed);
    }
    hex::decode(signature).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVATE_WITH_QUERY: &str = "https://example.com/activate?email=a@b.com";
    const ACTIVATE_NO_QUERY: &str = "https://example.com/activate";

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(SigningKey::new(secret))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn payload_with_query_gets_ampersand_field() {
        let signed = signer("k").sign(ACTIVATE_WITH_QUERY);

        assert!(signed.starts_with(ACTIVATE_WITH_QUERY));
        assert_eq!(signed.matches("&hash=").count(), 1);
        assert!(!signed.contains("?hash="));
    }

    #[test]
    fn payload_without_query_gets_question_mark_field() {
        let signed = signer("k").sign(ACTIVATE_NO_QUERY);

        assert!(signed.starts_with("https://example.com/activate?hash="));
        assert!(!signed.contains("&hash="));
    }

    #[test]
    fn sign_is_deterministic_for_same_key_payload_and_time() {
        let s = signer("k");
        assert_eq!(
            s.sign_at(ACTIVATE_WITH_QUERY, at(1_700_000_000)),
            s.sign_at(ACTIVATE_WITH_QUERY, at(1_700_000_000))
        );
        assert_ne!(
            s.sign_at(ACTIVATE_WITH_QUERY, at(1_700_000_000)),
            s.sign_at(ACTIVATE_WITH_QUERY, at(1_700_000_001))
        );
    }

    #[test]
    fn unsign_recovers_payload_and_timestamp() {
        let s = signer("k");
        let signed = s.sign_at(ACTIVATE_WITH_QUERY, at(1_700_000_000));

        assert_eq!(s.unsign(&signed), Ok(ACTIVATE_WITH_QUERY));
        assert_eq!(issued_at(&signed), Some(at(1_700_000_000)));
    }

    #[test]
    fn payload_containing_field_name_still_round_trips() {
        let s = signer("k");
        let payload = "https://example.com/x?hash=old&email=a.b@c.d";
        let signed = s.sign(payload);
        assert_eq!(s.unsign(&signed), Ok(payload));
    }

    #[test]
    fn wrong_key_is_bad_signature() {
        let signed = signer("k1").sign(ACTIVATE_WITH_QUERY);
        assert_eq!(signer("k2").unsign(&signed), Err(TokenError::BadSignature));
        assert!(!signer("k2").verify(&signed));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let s = signer("k");
        for input in [
            "",
            ".",
            "https://example.com/activate",
            "https://example.com/activate?hash=.",
            "https://example.com/activate?hash=abc.00",
            "https://example.com/activate&hash=1700000000.00",
            "hash=1700000000.00",
        ] {
            assert!(!s.verify(input), "accepted {input:?}");
            assert!(s.is_expired(input, Duration::minutes(60)), "not expired {input:?}");
        }
    }

    #[test]
    fn multibyte_char_before_field_fails_closed() {
        let s = signer("k");
        let zeros = "0".repeat(64);
        for input in [
            format!("https://example.com/caféhash=1700000000.{zeros}"),
            format!("https://example.com/activate?email=a@b.c日hash=1700000000.{zeros}"),
            format!("éhash=1700000000.{zeros}"),
            format!("ühash=.{zeros}"),
        ] {
            assert!(!s.verify(&input), "accepted {input:?}");
            assert_eq!(s.unsign(&input), Err(TokenError::Malformed));
            assert_eq!(issued_at(&input), None);
            assert_eq!(
                s.check(&input, Duration::minutes(60)),
                Err(TokenError::Malformed)
            );
            assert!(s.is_expired(&input, Duration::minutes(60)), "not expired {input:?}");
        }
    }

    #[test]
    fn uppercase_signature_is_rejected() {
        let s = signer("k");
        let signed = s.sign(ACTIVATE_NO_QUERY);
        let (head, sig) = signed.rsplit_once('.').unwrap();
        let upper = format!("{head}.{}", sig.to_ascii_uppercase());

        if upper != signed {
            assert_eq!(s.unsign(&upper), Err(TokenError::Malformed));
        }
    }

    #[test]
    fn expiry_uses_strictly_greater_than() {
        let s = signer("k");
        let issued = at(1_700_000_000);
        let signed = s.sign_at(ACTIVATE_WITH_QUERY, issued);
        let window = Duration::minutes(60);

        assert!(!s.is_expired_at(&signed, window, issued));
        assert!(!s.is_expired_at(&signed, window, issued + window));
        assert!(s.is_expired_at(&signed, window, issued + window + Duration::seconds(1)));
    }

    #[test]
    fn check_reports_expiry_only_for_authentic_tokens() {
        let s = signer("k");
        let issued = at(1_700_000_000);
        let signed = s.sign_at(ACTIVATE_WITH_QUERY, issued);
        let later = issued + Duration::hours(2);

        assert_eq!(
            s.check_at(&signed, Duration::minutes(60), issued),
            Ok(ACTIVATE_WITH_QUERY)
        );
        assert_eq!(
            s.check_at(&signed, Duration::minutes(60), later),
            Err(TokenError::Expired)
        );
        assert_eq!(
            signer("other").check_at(&signed, Duration::minutes(60), issued),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn signing_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", SigningKey::new("hunter2")), "SigningKey(<redacted>)");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn payload() -> impl Strategy<Value = String> {
            "https://[a-z]{1,12}\\.com/[a-zéü日]{0,12}(\\?[a-z]{1,8}=[a-zA-Z0-9@.éü日]{0,16}){0,1}"
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: a freshly signed payload verifies and unsigns to itself.
            #[test]
            fn sign_then_verify(p in payload(), secret in "[ -~]{1,32}") {
                let s = TokenSigner::new(SigningKey::new(secret));
                let signed = s.sign(&p);
                prop_assert!(s.verify(&signed));
                prop_assert_eq!(s.unsign(&signed), Ok(p.as_str()));
            }

            /// Property: flipping any single bit breaks verification.
            #[test]
            fn single_bit_flip_breaks_verification(
                p in payload(),
                index in any::<prop::sample::Index>(),
                bit in 0u8..8,
            ) {
                let s = TokenSigner::new(SigningKey::new("tamper-key"));
                let signed = s.sign_at(&p, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

                let mut bytes = signed.into_bytes();
                let i = index.index(bytes.len());
                bytes[i] ^= 1 << bit;

                if let Ok(mutated) = String::from_utf8(bytes) {
                    prop_assert!(!s.verify(&mutated));
                }
            }

            /// Property: a different key never verifies.
            #[test]
            fn foreign_key_never_verifies(
                p in payload(),
                k1 in "[a-z0-9]{1,24}",
                k2 in "[a-z0-9]{1,24}",
            ) {
                prop_assume!(k1 != k2);
                let signed = TokenSigner::new(SigningKey::new(k1)).sign(&p);
                prop_assert!(!TokenSigner::new(SigningKey::new(k2)).verify(&signed));
            }

            /// Property: arbitrary text before the field never panics and never verifies.
            #[test]
            fn arbitrary_prefix_fails_closed(prefix in "\\PC{0,32}", ts in "[0-9]{0,9}") {
                let s = TokenSigner::new(SigningKey::new("k"));
                let input = format!("{prefix}hash={ts}.{}", "0".repeat(64));

                prop_assert!(!s.verify(&input));
                prop_assert!(s.is_expired(&input, Duration::minutes(60)));
            }

            /// Property: not expired at issue time, expired once past the window.
            #[test]
            fn expires_after_window(p in payload(), minutes in 1i64..10_000) {
                let s = TokenSigner::new(SigningKey::new("k"));
                let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
                let signed = s.sign_at(&p, issued);
                let window = Duration::minutes(minutes);

                prop_assert!(!s.is_expired_at(&signed, window, issued));
                prop_assert!(s.is_expired_at(&signed, window, issued + window + Duration::seconds(1)));
            }
        }
    }
}
