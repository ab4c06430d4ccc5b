//! Persistence for encryption key material.
//!
//! The cache loads its key once at construction and saves it whenever a new
//! key is generated or rotated in. Nothing here runs on the read/write path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::crypto::EncryptionKeyMaterial;
use crate::{Error, Result};

/// Somewhere key material can live between process runs.
pub trait KeyStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<EncryptionKeyMaterial>>;

    /// Persist `material`, replacing whatever was stored.
    fn save(&self, material: &EncryptionKeyMaterial) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    version: u32,
    key: String,
    derivation_salt: String,
}

const STORED_KEY_VERSION: u32 = 1;

/// JSON file holding the key, written atomically and readable only by the
/// owner on Unix.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Store at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `<data dir>/doccache/key.json` for the current user.
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "outfitter", "doccache")
            .ok_or_else(|| Error::KeyStore("failed to determine data directory".into()))?;
        Ok(Self::new(dirs.data_dir().join("key.json")))
    }

    /// File the key lives in.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<EncryptionKeyMaterial>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let stored: StoredKey = serde_json::from_str(&raw)
            .map_err(|e| Error::KeyStore(format!("unreadable key file: {e}")))?;
        if stored.version != STORED_KEY_VERSION {
            return Err(Error::KeyStore(format!(
                "unsupported key file version {}",
                stored.version
            )));
        }
        let key = STANDARD
            .decode(stored.key)
            .map_err(|e| Error::KeyStore(format!("invalid key encoding: {e}")))?;
        let salt = STANDARD
            .decode(stored.derivation_salt)
            .map_err(|e| Error::KeyStore(format!("invalid salt encoding: {e}")))?;
        debug!(path = %self.path.display(), "loaded encryption key");
        EncryptionKeyMaterial::from_parts(&key, &salt).map(Some)
    }

    fn save(&self, material: &EncryptionKeyMaterial) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let stored = StoredKey {
            version: STORED_KEY_VERSION,
            key: STANDARD.encode(material.secret()),
            derivation_salt: STANDARD.encode(material.derivation_salt()),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        // Created 0600 on Unix.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %self.path.display(), "saved encryption key");
        Ok(())
    }
}

/// In-process slot. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    slot: Arc<Mutex<Option<EncryptionKeyMaterial>>>,
}

impl MemoryKeyStore {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled with `material`.
    #[must_use]
    pub fn with_material(material: EncryptionKeyMaterial) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(material))),
        }
    }

    /// Current content without going through the trait.
    #[must_use]
    pub fn peek(&self) -> Option<EncryptionKeyMaterial> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<EncryptionKeyMaterial>> {
        Ok(self.peek())
    }

    fn save(&self, material: &EncryptionKeyMaterial) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(material.clone());
        Ok(())
    }
}
