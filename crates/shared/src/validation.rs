//! Common validation utilities.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Loose address check: something, an `@`, something, a dot, something.
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Returns true when `email` looks like a deliverable address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Returns true for absolute `http://` or `https://` URLs.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("hello@websited.org"));
        assert!(is_valid_email("first.last+tag@sub.example.com.au"));
    }

    #[test]
    fn test_generated_emails_are_valid() {
        for _ in 0..20 {
            let email: String = SafeEmail().fake();
            assert!(is_valid_email(&email), "{} should be valid", email);
        }
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://websited.org"));
        assert!(is_http_url("http://example.com/page"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
        assert!(!is_http_url(""));
    }
}
