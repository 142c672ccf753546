//! Cryptographic helpers for admin authentication and log fingerprints.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, non-reversible fingerprint of an identifier for log fields.
///
/// Returns the first 12 hex characters of the SHA-256 digest.
pub fn fingerprint(input: &str) -> String {
    let mut digest = sha256_hex(input);
    digest.truncate(12);
    digest
}

/// Compares a provided secret against the expected one in constant time.
///
/// Both values are MACed under a fresh random key and the tags are compared
/// with `verify_slice`, so neither the content nor the length of the expected
/// secret leaks through timing.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);

    let (Ok(mut expected_mac), Ok(mut provided_mac)) = (
        HmacSha256::new_from_slice(&key),
        HmacSha256::new_from_slice(&key),
    ) else {
        return false;
    };

    expected_mac.update(expected.as_bytes());
    provided_mac.update(provided.as_bytes());

    let expected_tag = expected_mac.finalize().into_bytes();
    provided_mac.verify_slice(&expected_tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("test");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_sha256_hex_empty_string() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_is_prefix_of_digest() {
        let fp = fingerprint("session_abc");
        assert_eq!(fp.len(), 12);
        assert!(sha256_hex("session_abc").starts_with(&fp));
    }

    #[test]
    fn test_secrets_match_equal() {
        assert!(secrets_match("hunter2", "hunter2"));
    }

    #[test]
    fn test_secrets_match_different() {
        assert!(!secrets_match("hunter3", "hunter2"));
        assert!(!secrets_match("hunter", "hunter2"));
        assert!(!secrets_match("", "hunter2"));
    }

    #[test]
    fn test_secrets_match_is_case_sensitive() {
        assert!(!secrets_match("Hunter2", "hunter2"));
    }
}
