// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Contact Helpers
//!
//! Normalisation and validation for the contact details captured on a lead:
//! `tel:` hrefs, UK phone numbers and email addresses.

use regex::Regex;
use std::sync::LazyLock;

static UK_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?:\+44|0044)[\s\-]?7\d{3}[\s\-]?\d{6}",
        r"|07\d{3}[\s\-]?\d{6}",
        r"|(?:\+44|0044)[\s\-]?[123]\d{2,3}[\s\-]?\d{6,7}",
        r"|0[123]\d{2,3}[\s\-]?\d{6,7}",
        r")$"
    ))
    .expect("UK phone pattern is valid")
});

static PHONE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-()]").expect("separator pattern is valid"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Normalise a phone number to a `tel:` URI.
///
/// Every non-digit is dropped except a leading `+`. Empty input, or input
/// with nothing left after cleaning, yields an empty string.
pub fn normalize_phone_href(phone: &str) -> String {
    let (prefix, rest) = match phone.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", phone),
    };
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    let cleaned = format!("{prefix}{digits}");
    if cleaned.is_empty() {
        String::new()
    } else {
        format!("tel:{cleaned}")
    }
}

/// True for UK mobile and landline numbers, with or without `+44`/`0044`.
/// Spaces, hyphens and parentheses are ignored.
pub fn is_valid_uk_phone(phone: &str) -> bool {
    let normalized = PHONE_SEPARATORS.replace_all(phone.trim(), "");
    UK_PHONE.is_match(&normalized)
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.len() <= 254 && EMAIL.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_href() {
        assert_eq!(normalize_phone_href("+44 20 7946 0958"), "tel:+442079460958");
        assert_eq!(normalize_phone_href("020-7946-0958"), "tel:02079460958");
        assert_eq!(normalize_phone_href("+44 (0)20 7946 0958"), "tel:+4402079460958");
        assert_eq!(normalize_phone_href(""), "");
        assert_eq!(normalize_phone_href("call us"), "");
    }

    #[test]
    fn test_plus_only_kept_when_leading() {
        assert_eq!(normalize_phone_href("0800+123"), "tel:0800123");
        assert_eq!(normalize_phone_href("+"), "tel:+");
    }

    #[test]
    fn test_uk_phone_accepts_mobile_and_landline() {
        for phone in [
            "07700 900123",
            "+44 7700 900123",
            "0044 7700 900123",
            "020 7946 0958",
            "(0161) 496 0000",
            "+44 161 496 0000",
            "01632-960-001",
        ] {
            assert!(is_valid_uk_phone(phone), "{phone} should be valid");
        }
    }

    #[test]
    fn test_uk_phone_rejects_other_numbers() {
        for phone in ["12345", "+1 415 555 0100", "0800 123", "08001234567", "abc"] {
            assert!(!is_valid_uk_phone(phone), "{phone} should be invalid");
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email(" jane.doe+leads@mail.example.co.uk "));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane@@example.com"));
        assert!(!is_valid_email(""));
    }
}
