use crate::types::DateExt;
use chrono::NaiveDate;
use ring::{
    digest::{self, SHA256},
    hmac::{self, Key, Tag, HMAC_SHA256},
};

/// HMAC-SHA256 of `value` keyed with `key`.
pub fn hmac_sha256(key: &[u8], value: &[u8]) -> Tag {
    let key = Key::new(HMAC_SHA256, key);
    hmac::sign(&key, value)
}

/// Lowercase hex SHA-256 digest of a string.
pub fn encode_with_hex(input: &str) -> String {
    encode_bytes_with_hex(input.as_bytes())
}

/// Lowercase hex SHA-256 digest of raw bytes.
pub fn encode_bytes_with_hex(input: &[u8]) -> String {
    hex::encode(digest::digest(&SHA256, input))
}

pub fn calculate_signature(signing_key: Tag, string_to_sign: &[u8]) -> String {
    hex::encode(hmac_sha256(signing_key.as_ref(), string_to_sign))
}

/// Derives `kSigning` from the secret key:
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`.
pub fn generate_signing_key(secret: &str, date: NaiveDate, region: &str, service: &str) -> Tag {
    let secret = format!("AWS4{}", secret);
    let k_date = hmac_sha256(secret.as_bytes(), date.fmt_aws().as_bytes());
    let k_region = hmac_sha256(k_date.as_ref(), region.as_bytes());
    let k_service = hmac_sha256(k_region.as_ref(), service.as_bytes());
    hmac_sha256(k_service.as_ref(), crate::AWS4_REQUEST.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn empty_payload_digest() {
        assert_eq!(
            encode_bytes_with_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test_log::test]
    fn signing_key_chain() {
        // Example from the AWS "Deriving the signing key" documentation.
        let key = generate_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            NaiveDate::from_ymd_opt(2012, 2, 15).unwrap(),
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key.as_ref()),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }
}
