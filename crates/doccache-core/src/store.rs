//! Entry storage and bookkeeping.
//!
//! [`EntryStore`] is a plain map plus running byte totals. It holds no lock of
//! its own: the facade keeps it behind a single mutex, which is the one
//! exclusive-access boundary for inserts, touches, evictions, clears and the
//! rotation rewrite.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionLayer, SealedPayload, sha256_hex};
use crate::key::CacheKey;
use crate::{CacheCategory, Error, Result};

/// One stored value and its metadata.
///
/// When encryption is disabled `ciphertext` holds the serialized plaintext and
/// `nonce` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Sealed payload, or plaintext when encryption is off.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// AES-GCM nonce, empty for plaintext.
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Hex SHA-256 of the plaintext.
    pub checksum: String,
    /// Serialized plaintext length in bytes.
    pub original_size: usize,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// Last write or successful read.
    pub last_accessed_at: DateTime<Utc>,
    /// Writes and reads, starting at one.
    pub access_count: u64,
    /// Running mean read latency.
    pub avg_retrieval_latency: Duration,
}

impl CacheEntry {
    /// A freshly written entry counts as one access.
    #[must_use]
    pub fn new(
        payload: SealedPayload,
        checksum: String,
        original_size: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ciphertext: payload.ciphertext,
            nonce: payload.nonce,
            checksum,
            original_size,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            avg_retrieval_latency: Duration::ZERO,
        }
    }

    /// Build an entry for `plaintext`, sealing it when a layer is supplied.
    pub fn seal(
        plaintext: &[u8],
        layer: Option<&EncryptionLayer>,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let payload = match layer {
            Some(layer) => layer.encrypt(plaintext, &key.associated_data())?,
            None => SealedPayload {
                ciphertext: plaintext.to_vec(),
                nonce: Vec::new(),
            },
        };
        Ok(Self::new(payload, sha256_hex(plaintext), plaintext.len(), now))
    }

    /// Same metadata, new payload. Used by key rotation.
    #[must_use]
    pub fn with_payload(&self, payload: SealedPayload) -> Self {
        Self {
            ciphertext: payload.ciphertext,
            nonce: payload.nonce,
            ..self.clone()
        }
    }

    /// Bytes this entry occupies in the store's byte budget.
    #[must_use]
    pub fn stored_size(&self) -> u64 {
        self.ciphertext.len() as u64
    }

    /// Whether the payload is sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        !self.nonce.is_empty()
    }

    /// Recover and verify the plaintext.
    ///
    /// An encrypted entry read without a layer, or a plaintext entry read with
    /// one, is a [`Error::DecryptionFailed`]. A checksum mismatch is an
    /// [`Error::IntegrityCheckFailed`].
    pub fn open(&self, layer: Option<&EncryptionLayer>, key: &CacheKey) -> Result<Vec<u8>> {
        let plaintext = match (layer, self.is_encrypted()) {
            (Some(layer), true) => {
                layer.decrypt(&self.ciphertext, &self.nonce, &key.associated_data())?
            },
            (None, false) => self.ciphertext.clone(),
            _ => return Err(Error::DecryptionFailed),
        };
        if sha256_hex(&plaintext) != self.checksum {
            return Err(Error::IntegrityCheckFailed);
        }
        Ok(plaintext)
    }

    /// Bump recency and count, folding `latency` into the running mean.
    pub fn record_access(&mut self, now: DateTime<Utc>, latency: Duration) {
        let previous = u32::try_from(self.access_count).unwrap_or(u32::MAX);
        let total = self
            .avg_retrieval_latency
            .saturating_mul(previous)
            .saturating_add(latency);
        self.access_count = self.access_count.saturating_add(1);
        self.avg_retrieval_latency = total / previous.saturating_add(1);
        self.last_accessed_at = now;
    }
}

/// Key to entry map with byte accounting.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: u64,
    last_cleanup: Option<DateTime<Utc>>,
}

impl EntryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert. Returns the entry that was replaced, if any.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry> {
        self.total_bytes += entry.stored_size();
        let previous = self.entries.insert(key, entry);
        if let Some(old) = &previous {
            self.total_bytes -= old.stored_size();
        }
        previous
    }

    /// Entry for `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Record a successful read against `key`.
    pub fn touch(&mut self, key: &CacheKey, now: DateTime<Utc>, latency: Duration) -> bool {
        self.entries.get_mut(key).is_some_and(|entry| {
            entry.record_access(now, latency);
            true
        })
    }

    /// Remove `key`, returning its entry.
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.total_bytes -= removed.stored_size();
        Some(removed)
    }

    /// Drop every entry and stamp the cleanup time.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.entries.clear();
        self.total_bytes = 0;
        self.last_cleanup = Some(now);
    }

    /// Swap in a whole new entry set, returning the old one.
    pub fn replace_all(
        &mut self,
        entries: HashMap<CacheKey, CacheEntry>,
    ) -> HashMap<CacheKey, CacheEntry> {
        self.total_bytes = entries.values().map(CacheEntry::stored_size).sum();
        std::mem::replace(&mut self.entries, entries)
    }

    /// Underlying map.
    #[must_use]
    pub const fn entries(&self) -> &HashMap<CacheKey, CacheEntry> {
        &self.entries
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of stored payload sizes.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Last eviction sweep or clear.
    #[must_use]
    pub const fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        self.last_cleanup
    }

    /// Stamp the cleanup time.
    pub const fn mark_cleanup(&mut self, now: DateTime<Utc>) {
        self.last_cleanup = Some(now);
    }

    /// `(documents, analyses)` currently stored.
    #[must_use]
    pub fn category_counts(&self) -> (usize, usize) {
        let documents = self.entries.keys().filter(|k| k.category().is_document()).count();
        (documents, self.entries.len() - documents)
    }

    /// Categories ordered by summed access count, highest first.
    #[must_use]
    pub fn top_categories(&self, limit: usize) -> Vec<(CacheCategory, u64)> {
        let mut totals: HashMap<CacheCategory, u64> = HashMap::new();
        for (key, entry) in &self.entries {
            let total = totals.entry(key.category()).or_default();
            *total = total.saturating_add(entry.access_count);
        }
        let mut ranked: Vec<_> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Remove entries not accessed since `cutoff`. Returns how many went.
    pub fn purge_idle(&mut self, cutoff: DateTime<Utc>) -> usize {
        let idle: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_accessed_at < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &idle {
            self.remove(key);
        }
        idle.len()
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
