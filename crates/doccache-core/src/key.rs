//! Cache key construction.
//!
//! A [`CacheKey`] is derived from a category and free-text requirement. The
//! text is trimmed, lowercased and cut to a bounded prefix before hashing, so
//! requests that differ only in case, surrounding whitespace or a long tail
//! deliberately land on the same entry.
//!
//! ```rust
//! use doccache_core::{CacheCategory, DocumentType, KeyNormalizer};
//!
//! let normalizer = KeyNormalizer::default();
//! let a = normalizer.normalize(DocumentType::Sow.into(), "Build a website");
//! let b = normalizer.normalize(DocumentType::Sow.into(), "  BUILD A WEBSITE\n");
//! assert_eq!(a, b);
//! assert!(a.to_string().starts_with("sow:"));
//!
//! let analysis = normalizer.normalize(CacheCategory::Analysis, "Build a website");
//! assert_ne!(a, analysis);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::sha256_hex;
use crate::{CacheCategory, Error, Result};

/// Default number of characters of the normalized requirement that take part
/// in the key.
pub const DEFAULT_REQUIREMENT_PREFIX_CHARS: usize = 200;

/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Normalized identifier of a cached value: `<category-slug>:<sha256-hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    category: CacheCategory,
    digest: String,
}

impl CacheKey {
    /// Category the key belongs to.
    #[must_use]
    pub const fn category(&self) -> CacheCategory {
        self.category
    }

    /// Hex digest of the normalized requirement.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Bytes bound into the AEAD tag of entries stored under this key.
    #[must_use]
    pub fn associated_data(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category.slug(), self.digest)
    }
}

impl FromStr for CacheKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (slug, digest) = s
            .split_once(':')
            .ok_or_else(|| Error::Serialization(format!("cache key '{s}' has no category prefix")))?;
        let category = slug
            .parse::<CacheCategory>()
            .map_err(|_| Error::Serialization(format!("cache key '{s}' has unknown category")))?;
        let well_formed = digest.len() == DIGEST_HEX_LEN
            && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !well_formed {
            return Err(Error::Serialization(format!("cache key '{s}' has a malformed digest")));
        }
        Ok(Self {
            category,
            digest: digest.to_string(),
        })
    }
}

impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Derives [`CacheKey`]s. Pure and total: never fails, no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNormalizer {
    prefix_chars: usize,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIREMENT_PREFIX_CHARS)
    }
}

impl KeyNormalizer {
    /// Normalizer keeping the first `prefix_chars` characters.
    #[must_use]
    pub const fn new(prefix_chars: usize) -> Self {
        Self { prefix_chars }
    }

    /// Characters kept after normalization.
    #[must_use]
    pub const fn prefix_chars(&self) -> usize {
        self.prefix_chars
    }

    /// Trim, lowercase and truncate `raw` to the configured prefix.
    #[must_use]
    pub fn normalize_text(&self, raw: &str) -> String {
        raw.trim().to_lowercase().chars().take(self.prefix_chars).collect()
    }

    /// Key for `raw` in `category`.
    #[must_use]
    pub fn normalize(&self, category: CacheCategory, raw: &str) -> CacheKey {
        let digest = sha256_hex(self.normalize_text(raw).as_bytes());
        CacheKey { category, digest }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::DocumentType;
    use proptest::prelude::*;

    const SOW: CacheCategory = CacheCategory::Document(DocumentType::Sow);

    #[test]
    fn test_case_and_whitespace_collapse() {
        let normalizer = KeyNormalizer::default();
        assert_eq!(
            normalizer.normalize(SOW, "Build a website"),
            normalizer.normalize(SOW, "\tbuild A WEBSITE  ")
        );
    }

    #[test]
    fn test_category_separates_keys() {
        let normalizer = KeyNormalizer::default();
        assert_ne!(
            normalizer.normalize(SOW, "same text"),
            normalizer.normalize(CacheCategory::Document(DocumentType::Pws), "same text")
        );
    }

    #[test]
    fn test_long_requirements_collide_past_prefix() {
        let normalizer = KeyNormalizer::new(10);
        let a = normalizer.normalize(SOW, "0123456789 first tail");
        let b = normalizer.normalize(SOW, "0123456789 second tail");
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let normalizer = KeyNormalizer::new(3);
        assert_eq!(normalizer.normalize_text("ÉÉÉÉ"), "ééé");
    }

    #[test]
    fn test_empty_requirement_is_valid() {
        let normalizer = KeyNormalizer::default();
        let key = normalizer.normalize(CacheCategory::Analysis, "   ");
        assert_eq!(key, normalizer.normalize(CacheCategory::Analysis, ""));
        assert_eq!(key.digest().len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_display_parse_round_trip() {
        let key = KeyNormalizer::default().normalize(SOW, "Build a website");
        let parsed: CacheKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert!("sow".parse::<CacheKey>().is_err());
        assert!("memo:abcd".parse::<CacheKey>().is_err());
        assert!(format!("sow:{}", "Z".repeat(64)).parse::<CacheKey>().is_err());
    }

    #[test]
    fn test_serde_uses_display_form() {
        let key = KeyNormalizer::default().normalize(CacheCategory::Analysis, "x");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{key}\""));
        let back: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    proptest! {
        #[test]
        fn prop_normalize_ignores_surrounding_whitespace(text in "\\PC{0,300}") {
            let normalizer = KeyNormalizer::default();
            let padded = format!("  {text}\n\t");
            prop_assert_eq!(normalizer.normalize(SOW, &text), normalizer.normalize(SOW, &padded));
        }

        #[test]
        fn prop_normalize_ignores_ascii_case(text in "[a-zA-Z0-9 ]{0,300}") {
            let normalizer = KeyNormalizer::default();
            prop_assert_eq!(
                normalizer.normalize(CacheCategory::Analysis, &text),
                normalizer.normalize(CacheCategory::Analysis, &text.to_ascii_uppercase())
            );
        }
    }
}
