//! HMAC-SHA256 signatures on incoming life-cycle signals.
//!
//! The host signs the raw request body with the shared secret and sends it in
//! the `x-signal-signature` header as `sha256=<hex>`. Verification runs before
//! the body is parsed.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-signal-signature";

/// Parses `sha256=<hex>` into raw signature bytes. Never panics.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix("sha256=")?).ok()
}

/// Produces the header value a sender attaches to `payload`.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks `signature_header` against `payload` in constant time.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_rejects_malformed_headers() {
        assert_eq!(parse_signature_header("sha256=1234abcd"), Some(vec![0x12, 0x34, 0xab, 0xcd]));
        assert_eq!(parse_signature_header("1234abcd"), None);
        assert_eq!(parse_signature_header("sha1=1234abcd"), None);
        assert_eq!(parse_signature_header("sha256=xyz"), None);
        assert_eq!(parse_signature_header("sha256=abc"), None);
    }

    #[test]
    fn rfc4231_test_case_2() {
        // Key "Jefe", data "what do ya want for nothing?"
        let header = sign_payload(b"what do ya want for nothing?", b"Jefe").unwrap();
        assert_eq!(
            header,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn wrong_secret_or_body_fails() {
        let body = br#"{"type":"page_deleted","page_id":7}"#;
        let header = sign_payload(body, b"secret").unwrap();

        assert!(verify_signature(body, &header, b"secret"));
        assert!(!verify_signature(body, &header, b"other"));
        assert!(!verify_signature(br#"{"type":"page_deleted","page_id":8}"#, &header, b"secret"));
        assert!(!verify_signature(body, "sha256=", b"secret"));
    }

    proptest! {
        #[test]
        fn signed_payloads_verify(
            payload in prop::collection::vec(any::<u8>(), 0..512),
            secret in prop::collection::vec(any::<u8>(), 1..64),
        ) {
            let header = sign_payload(&payload, &secret).unwrap();
            prop_assert!(verify_signature(&payload, &header, &secret));
        }

        #[test]
        fn arbitrary_headers_never_panic(header in ".{0,100}") {
            let _ = verify_signature(b"payload", &header, b"secret");
        }
    }
}
