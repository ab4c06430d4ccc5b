//! Snapshot format for `export_encrypted_backup` / `import_encrypted_backup`.
//!
//! A snapshot is JSON:
//!
//! ```json
//! {
//!   "header": {
//!     "formatVersion": 1,
//!     "keyDerivationSalt": "<base64 or null>",
//!     "encrypted": true,
//!     "createdAt": "2024-01-01T00:00:00Z",
//!     "entryCount": 2
//!   },
//!   "records": [ { "key": "sow:<sha256>", "entry": { ... } } ]
//! }
//! ```
//!
//! Entries keep their ciphertext, nonce and checksum verbatim; nothing is
//! decrypted on export.

use std::collections::{HashMap, HashSet};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::CacheKey;
use crate::store::CacheEntry;
use crate::{Error, Result};

/// Version written into every backup header.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Snapshot-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupHeader {
    /// Must equal [`BACKUP_FORMAT_VERSION`].
    pub format_version: u32,
    /// Base64 salt of the key the entries are sealed under.
    pub key_derivation_salt: Option<String>,
    /// Whether records hold ciphertext.
    pub encrypted: bool,
    /// Export time.
    pub created_at: DateTime<Utc>,
    /// Number of records that follow.
    pub entry_count: usize,
}

impl BackupHeader {
    /// Decoded salt, if the header carries one.
    pub fn salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.key_derivation_salt
            .as_deref()
            .map(|salt| {
                STANDARD
                    .decode(salt)
                    .map_err(|e| Error::Backup(format!("invalid salt encoding: {e}")))
            })
            .transpose()
    }
}

/// One stored entry and its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Entry key.
    pub key: CacheKey,
    /// Entry payload and metadata.
    pub entry: CacheEntry,
}

/// Serializable copy of a whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Metadata.
    pub header: BackupHeader,
    /// Records ordered by key.
    pub records: Vec<BackupRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    header: HeaderProbe,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderProbe {
    format_version: u32,
}

impl Backup {
    /// Snapshot `entries`, ordered by key so equal stores encode identically.
    #[must_use]
    pub fn new<'a>(
        entries: impl IntoIterator<Item = (&'a CacheKey, &'a CacheEntry)>,
        encrypted: bool,
        salt: Option<&[u8]>,
    ) -> Self {
        let mut records: Vec<BackupRecord> = entries
            .into_iter()
            .map(|(key, entry)| BackupRecord {
                key: key.clone(),
                entry: entry.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            header: BackupHeader {
                format_version: BACKUP_FORMAT_VERSION,
                key_derivation_salt: salt.map(|s| STANDARD.encode(s)),
                encrypted,
                created_at: Utc::now(),
                entry_count: records.len(),
            },
            records,
        }
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a snapshot. Nothing partial is ever returned.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes)
            .map_err(|e| Error::Backup(format!("malformed snapshot: {e}")))?;
        if probe.header.format_version != BACKUP_FORMAT_VERSION {
            return Err(Error::Backup(format!(
                "unsupported format version {} (expected {BACKUP_FORMAT_VERSION})",
                probe.header.format_version
            )));
        }

        let backup: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::Backup(format!("malformed snapshot: {e}")))?;
        if backup.header.entry_count != backup.records.len() {
            return Err(Error::Backup(format!(
                "header declares {} entries but {} records are present",
                backup.header.entry_count,
                backup.records.len()
            )));
        }

        let mut seen = HashSet::with_capacity(backup.records.len());
        for record in &backup.records {
            if !seen.insert(&record.key) {
                return Err(Error::Backup(format!("duplicate key {}", record.key)));
            }
            if record.entry.is_encrypted() != backup.header.encrypted {
                return Err(Error::Backup(format!(
                    "record {} does not match the snapshot's encryption mode",
                    record.key
                )));
            }
        }
        backup.header.salt_bytes()?;
        Ok(backup)
    }

    /// Entries keyed for [`crate::store::EntryStore::replace_all`].
    #[must_use]
    pub fn into_entries(self) -> HashMap<CacheKey, CacheEntry> {
        self.records.into_iter().map(|r| (r.key, r.entry)).collect()
    }
}
