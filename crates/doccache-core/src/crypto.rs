//! Authenticated encryption for cached payloads.
//!
//! Every entry is sealed with AES-256-GCM under a key derived with
//! HKDF-SHA256 from the process's [`EncryptionKeyMaterial`]. Nonces are 96
//! random bits drawn from the system CSPRNG for every call, and the cache key
//! is bound in as associated data so a ciphertext cannot be replayed under a
//! different key.
//!
//! ```rust
//! use doccache_core::{EncryptionKeyMaterial, EncryptionLayer};
//!
//! let layer = EncryptionLayer::new(EncryptionKeyMaterial::generate()?)?;
//! let sealed = layer.encrypt(b"SOW text", b"sow:example")?;
//! assert_ne!(sealed.ciphertext.as_slice(), b"SOW text");
//!
//! let opened = layer.decrypt(&sealed.ciphertext, &sealed.nonce, b"sow:example")?;
//! assert_eq!(opened, b"SOW text");
//!
//! // Wrong associated data fails authentication.
//! assert!(layer.decrypt(&sealed.ciphertext, &sealed.nonce, b"sow:other").is_err());
//! # Ok::<(), doccache_core::Error>(())
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::hkdf::{HKDF_SHA256, Salt};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::key::CacheKey;
use crate::store::CacheEntry;
use crate::{Error, Result};

/// Length of the secret and of the derivation salt, in bytes.
pub const KEY_LEN: usize = 32;

/// HKDF info label; bump alongside the backup format if derivation changes.
const HKDF_INFO: &[u8] = b"doccache entry v1";

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().fold(String::with_capacity(64), |mut acc, b| {
        // write! to String is infallible
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Secret plus derivation salt. Replaced wholesale on rotation.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKeyMaterial {
    key: [u8; KEY_LEN],
    derivation_salt: [u8; KEY_LEN],
}

impl fmt::Debug for EncryptionKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyMaterial")
            .field("key", &"<redacted>")
            .field("derivation_salt", &self.derivation_salt)
            .finish()
    }
}

impl EncryptionKeyMaterial {
    /// Fresh secret and salt from the system CSPRNG.
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let mut key = [0u8; KEY_LEN];
        let mut derivation_salt = [0u8; KEY_LEN];
        rng.fill(&mut key)
            .map_err(|_| Error::Crypto("system random source unavailable".into()))?;
        rng.fill(&mut derivation_salt)
            .map_err(|_| Error::Crypto("system random source unavailable".into()))?;
        Ok(Self {
            key,
            derivation_salt,
        })
    }

    /// Rebuild material from persisted bytes.
    pub fn from_parts(key: &[u8], derivation_salt: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| Error::Crypto(format!("key must be {KEY_LEN} bytes, got {}", key.len())))?;
        let derivation_salt: [u8; KEY_LEN] = derivation_salt.try_into().map_err(|_| {
            Error::Crypto(format!(
                "derivation salt must be {KEY_LEN} bytes, got {}",
                derivation_salt.len()
            ))
        })?;
        Ok(Self {
            key,
            derivation_salt,
        })
    }

    pub(crate) const fn secret(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Salt fed to HKDF.
    #[must_use]
    pub const fn derivation_salt(&self) -> &[u8; KEY_LEN] {
        &self.derivation_salt
    }
}

/// Output of [`EncryptionLayer::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// Ciphertext with the 16-byte GCM tag appended.
    pub ciphertext: Vec<u8>,
    /// AES-GCM nonce.
    pub nonce: Vec<u8>,
}

/// Result of re-encrypting a store under fresh key material.
pub struct Rotation {
    /// Layer holding the new key.
    pub layer: EncryptionLayer,
    /// Every entry sealed under the new key.
    pub entries: HashMap<CacheKey, CacheEntry>,
    /// Entries that no longer opened under the old key and were dropped.
    pub purged: Vec<CacheKey>,
}

/// Holds the active key and performs AEAD sealing/opening.
pub struct EncryptionLayer {
    material: EncryptionKeyMaterial,
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for EncryptionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionLayer")
            .field("material", &self.material)
            .finish_non_exhaustive()
    }
}

impl EncryptionLayer {
    /// Derive the AEAD key from `material`.
    pub fn new(material: EncryptionKeyMaterial) -> Result<Self> {
        let salt = Salt::new(HKDF_SHA256, material.derivation_salt());
        let prk = salt.extract(material.secret());
        let okm = prk
            .expand(&[HKDF_INFO], &AES_256_GCM)
            .map_err(|_| Error::Crypto("key derivation failed".into()))?;
        let key = LessSafeKey::new(UnboundKey::from(okm));
        Ok(Self {
            material,
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Key material this layer was derived from.
    #[must_use]
    pub const fn material(&self) -> &EncryptionKeyMaterial {
        &self.material
    }

    /// Salt of the active key material.
    #[must_use]
    pub const fn derivation_salt(&self) -> &[u8; KEY_LEN] {
        self.material.derivation_salt()
    }

    /// Seal `plaintext` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<SealedPayload> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| Error::Crypto("system random source unavailable".into()))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(associated_data),
                &mut in_out,
            )
            .map_err(|_| Error::Crypto("sealing failed".into()))?;

        Ok(SealedPayload {
            ciphertext: in_out,
            nonce: nonce_bytes.to_vec(),
        })
    }

    /// Open a sealed payload.
    ///
    /// Any tampering, a wrong key, wrong associated data or a malformed nonce
    /// all surface as [`Error::DecryptionFailed`].
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| Error::DecryptionFailed)?;
        let mut in_out = ciphertext.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::from(associated_data), &mut in_out)
            .map_err(|_| Error::DecryptionFailed)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }

    /// Re-encrypt `entries` under freshly generated key material.
    ///
    /// `self` is left untouched; the caller swaps the returned layer and
    /// entries in together or discards them. Entries that fail to open or
    /// verify under the current key are dropped and reported in
    /// [`Rotation::purged`].
    pub fn rotate(&self, entries: &HashMap<CacheKey, CacheEntry>) -> Result<Rotation> {
        let layer = Self::new(EncryptionKeyMaterial::generate()?)?;
        let mut rotated = HashMap::with_capacity(entries.len());
        let mut purged = Vec::new();

        for (key, entry) in entries {
            let plaintext = match entry.open(Some(self), key) {
                Ok(plaintext) => plaintext,
                Err(err) if err.is_degraded_read() => {
                    warn!(key = %key, error = %err, "dropping unreadable entry during key rotation");
                    purged.push(key.clone());
                    continue;
                },
                Err(err) => return Err(err),
            };
            let sealed = layer.encrypt(&plaintext, &key.associated_data())?;
            rotated.insert(key.clone(), entry.with_payload(sealed));
        }

        Ok(Rotation {
            layer,
            entries: rotated,
            purged,
        })
    }
}
