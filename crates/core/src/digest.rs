//! Input fingerprinting.
//!
//! A digest identifies one exact input text so that a persisted run can be
//! matched against whatever text is currently being edited. The hash covers
//! the text prefixed with its character count, which keeps short and empty
//! inputs apart even before the hash itself is compared.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fingerprint of a raw input text.
///
/// Two digests are equal iff both the hash and the length match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDigest {
    /// Lowercase hex SHA-256 of `"{length}:{text}"`.
    pub hash: String,
    /// Character count of the raw text.
    pub length: usize,
}

impl InputDigest {
    /// Compute the digest of `text`.
    pub fn compute(text: &str) -> Self {
        let length = text.chars().count();
        let mut hasher = Sha256::new();
        hasher.update(length.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        Self {
            hash: format!("{:x}", hasher.finalize()),
            length,
        }
    }

    /// Returns true if this digest identifies the same text as `other`.
    pub fn matches(&self, other: &InputDigest) -> bool {
        self == other
    }

    /// Returns true if this digest was computed from `text`.
    pub fn matches_text(&self, text: &str) -> bool {
        self.matches(&Self::compute(text))
    }

    /// Compact `hash:length` key, short enough for log lines.
    pub fn short_key(&self) -> String {
        let prefix: String = self.hash.chars().take(12).collect();
        format!("{}:{}", prefix, self.length)
    }
}

/// Compare two optional digests; a missing digest never matches.
pub fn digests_match(a: Option<&InputDigest>, b: Option<&InputDigest>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_deterministic() {
        let a = InputDigest::compute("The heart has four chambers.");
        let b = InputDigest::compute("The heart has four chambers.");
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let digest = InputDigest::compute("فشار");
        assert_eq!(digest.length, 4);
    }

    #[test]
    fn test_different_lengths_never_match() {
        let a = InputDigest::compute("abc");
        let b = InputDigest::compute("abcd");
        assert_ne!(a, b);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_same_length_different_text() {
        let a = InputDigest::compute("abc");
        let b = InputDigest::compute("abd");
        assert_eq!(a.length, b.length);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_empty_text() {
        let digest = InputDigest::compute("");
        assert_eq!(digest.length, 0);
        assert!(digest.matches_text(""));
        assert!(!digest.matches_text(" "));
    }

    #[test]
    fn test_equality_requires_both_fields() {
        let a = InputDigest::compute("abc");
        let forged = InputDigest {
            hash: a.hash.clone(),
            length: 99,
        };
        assert!(!a.matches(&forged));
    }

    #[test]
    fn test_digests_match_optional() {
        let a = InputDigest::compute("x");
        assert!(digests_match(Some(&a), Some(&a.clone())));
        assert!(!digests_match(Some(&a), None));
        assert!(!digests_match(None, None));
    }

    #[test]
    fn test_short_key() {
        let digest = InputDigest::compute("hello");
        let key = digest.short_key();
        assert!(key.ends_with(":5"));
        assert_eq!(key.len(), 12 + 2);
    }

    #[test]
    fn test_short_key_tolerates_non_hex_hash() {
        let digest = InputDigest {
            hash: "ééééééééééééé".to_string(),
            length: 3,
        };
        assert_eq!(digest.short_key(), "éééééééééééé:3");

        let short = InputDigest {
            hash: "ab".to_string(),
            length: 0,
        };
        assert_eq!(short.short_key(), "ab:0");
    }
}
