//! Error types and handling for doccache-core operations.
//!
//! This module provides a single error type that covers every failure the
//! cache can report. Errors are categorized for easier handling and carry
//! hints about whether a retry could help.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: key store files, configuration files, snapshots
//! - **Configuration Errors**: invalid settings or mode changes on a populated cache
//! - **Serialization Errors**: value encoding, backup and config formats
//! - **Crypto Errors**: key generation, sealing, opening, integrity verification
//! - **Backup Errors**: malformed or incompatible snapshots
//!
//! ## Degraded Reads
//!
//! [`Error::DecryptionFailed`] and [`Error::IntegrityCheckFailed`] never reach
//! callers of the read path: the cache purges the offending entry and reports
//! a miss. They are still part of the public type because the lower-level
//! building blocks ([`crate::EncryptionLayer`], [`crate::store::CacheEntry`])
//! return them directly.
//!
//! ```rust
//! use doccache_core::Error;
//!
//! let err = Error::IntegrityCheckFailed;
//! assert!(err.is_degraded_read());
//! assert_eq!(err.category(), "integrity");
//! ```

use thiserror::Error;

/// The main error type for doccache-core operations.
///
/// All fallible public functions return `Result<T, Error>`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers key store files, configuration files and snapshot files. None
    /// of these are touched on the `cache`/`get` hot path.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is invalid or inaccessible.
    ///
    /// ## Common Causes
    ///
    /// - A limit configured as zero
    /// - Malformed TOML in the config file
    /// - An environment override that does not parse
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    ///
    /// Raised when a cached value cannot be encoded, when a verified payload
    /// cannot be decoded back into a value, or when a backup/config document
    /// has the wrong shape. Indicates a schema or data-shape bug upstream of
    /// the cache and is always propagated.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A cryptographic primitive failed.
    ///
    /// Key generation, key derivation or sealing failed. These failures come
    /// from the platform random source or from invalid key lengths.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The authentication tag did not verify.
    ///
    /// Either the ciphertext was tampered with or it was sealed under a
    /// different key. Treated as a cache miss by the facade.
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// The decrypted payload does not match its recorded SHA-256 checksum.
    ///
    /// Treated as a cache miss by the facade; the entry is purged.
    #[error("Integrity check failed: checksum mismatch")]
    IntegrityCheckFailed,

    /// Key rotation was requested on a cache that does not encrypt.
    #[error("Encryption is not enabled for this cache")]
    EncryptionNotEnabled,

    /// A mode switch was requested while the cache still holds entries.
    ///
    /// Entries written under one mode cannot be reinterpreted under another.
    /// Clear the cache explicitly and retry; the cache never clears itself.
    #[error("Configuration change requires clearing the cache first")]
    ConfigurationChangeRequiresClear,

    /// The persisted key material could not be loaded or saved.
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// A backup snapshot was rejected.
    ///
    /// ## Common Causes
    ///
    /// - Unknown format version
    /// - Snapshot written under a different key or encryption mode
    /// - Duplicate or unparsable record keys
    #[error("Backup error: {0}")]
    Backup(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Only transient I/O failures qualify. Everything else is either a
    /// programmer error, a data-shape bug or a deliberate rejection.
    ///
    /// ```rust
    /// use doccache_core::Error;
    /// use std::io;
    ///
    /// assert!(Error::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr")).is_recoverable());
    /// assert!(!Error::EncryptionNotEnabled.is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether the facade converts this error into a cache miss.
    #[must_use]
    pub const fn is_degraded_read(&self) -> bool {
        matches!(self, Self::DecryptionFailed | Self::IntegrityCheckFailed)
    }

    /// Get the error category as a string identifier.
    ///
    /// Stable snake-case labels intended for structured log fields.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Config(_) | Self::ConfigurationChangeRequiresClear => "config",
            Self::Serialization(_) => "serialization",
            Self::Crypto(_) | Self::EncryptionNotEnabled => "crypto",
            Self::DecryptionFailed | Self::IntegrityCheckFailed => "integrity",
            Self::KeyStore(_) => "key_store",
            Self::Backup(_) => "backup",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_formatting() {
        let cases = vec![
            (Error::Config("zero limit".to_string()), "Configuration error"),
            (Error::Serialization("bad json".to_string()), "Serialization error"),
            (Error::Crypto("rng".to_string()), "Crypto error"),
            (Error::KeyStore("missing".to_string()), "Key store error"),
            (Error::Backup("version 9".to_string()), "Backup error"),
            (Error::DecryptionFailed, "Decryption failed"),
            (Error::IntegrityCheckFailed, "Integrity check failed"),
            (Error::EncryptionNotEnabled, "not enabled"),
            (Error::ConfigurationChangeRequiresClear, "requires clearing"),
        ];

        for (error, needle) in cases {
            let rendered = error.to_string();
            assert!(rendered.contains(needle), "{rendered:?} should contain {needle:?}");
        }
    }

    #[test]
    fn test_degraded_reads_are_only_integrity_failures() {
        assert!(Error::DecryptionFailed.is_degraded_read());
        assert!(Error::IntegrityCheckFailed.is_degraded_read());
        assert!(!Error::EncryptionNotEnabled.is_degraded_read());
        assert!(!Error::Serialization("x".into()).is_degraded_read());
    }

    #[test]
    fn test_recoverability() {
        let transient = Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
        let permanent = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));

        assert!(transient.is_recoverable());
        assert!(!permanent.is_recoverable());
        assert!(!Error::ConfigurationChangeRequiresClear.is_recoverable());
        assert!(!Error::Backup("bad".into()).is_recoverable());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: Error = serde_json::from_str::<u32>("not a number").unwrap_err().into();
        assert_eq!(err.category(), "serialization");
    }

    #[test]
    fn test_categories_are_stable() {
        assert_eq!(Error::Config(String::new()).category(), "config");
        assert_eq!(Error::ConfigurationChangeRequiresClear.category(), "config");
        assert_eq!(Error::EncryptionNotEnabled.category(), "crypto");
        assert_eq!(Error::KeyStore(String::new()).category(), "key_store");
    }
}
