//! Snapshot-backed cache sessions.
//!
//! A [`Session`] is one `DocumentCache` whose contents are loaded from the
//! snapshot file on open and written back by [`Session::save`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use doccache_core::{Backup, CacheConfig, DocumentCache, FileKeyStore, KeyStore, RotationSummary};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::cli::Cli;

const SNAPSHOT_FILE: &str = "cache.snapshot";
const KEY_FILE: &str = "key.json";

/// Files a command works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    pub config: PathBuf,
    pub snapshot: PathBuf,
    pub key_file: PathBuf,
}

impl Locations {
    /// Explicit flags win; everything else comes from the platform
    /// directories.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "outfitter", "doccache");
        let data_file = |name: &str| -> Result<PathBuf> {
            dirs.as_ref()
                .map(|dirs| dirs.data_dir().join(name))
                .context("Failed to determine data directory")
        };

        let config = match &cli.config {
            Some(path) => path.clone(),
            None => CacheConfig::config_path()?,
        };
        let snapshot = match &cli.snapshot {
            Some(path) => path.clone(),
            None => data_file(SNAPSHOT_FILE)?,
        };
        let key_file = match &cli.key_file {
            Some(path) => path.clone(),
            None => data_file(KEY_FILE)?,
        };
        Ok(Self {
            config,
            snapshot,
            key_file,
        })
    }
}

/// Effective configuration: a preset when one was named, else the config
/// file when it exists, else defaults. Environment overrides apply last.
pub fn load_config(preset: Option<&str>, config_path: &Path) -> Result<CacheConfig> {
    let config = if let Some(name) = preset {
        CacheConfig::preset(name)?
    } else if config_path.exists() {
        CacheConfig::load_from(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        CacheConfig::default()
    };
    Ok(config.with_env_overrides()?)
}

/// A cache bound to a snapshot file.
pub struct Session {
    cache: DocumentCache,
    snapshot: PathBuf,
    key_store: FileKeyStore,
}

impl Session {
    /// Build the cache and import the snapshot if one exists.
    pub async fn open(config: CacheConfig, locations: &Locations) -> Result<Self> {
        let session = Self::open_empty(config, locations)?;
        if let Some(bytes) = read_snapshot(&session.snapshot)? {
            let imported = session
                .cache
                .import_encrypted_backup(&bytes)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load snapshot {} (run `doccache clear --force` to start over)",
                        session.snapshot.display()
                    )
                })?;
            debug!(imported, path = %session.snapshot.display(), "loaded snapshot");
        }
        Ok(session)
    }

    /// Build the cache without reading the snapshot.
    pub fn open_empty(config: CacheConfig, locations: &Locations) -> Result<Self> {
        let key_store = FileKeyStore::new(&locations.key_file);
        let cache = DocumentCache::builder()
            .config(config)
            .key_store(key_store.clone())
            .background_resizing(false)
            .build()
            .context("Failed to initialize cache")?;
        Ok(Self {
            cache,
            snapshot: locations.snapshot.clone(),
            key_store,
        })
    }

    pub const fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    /// Export the cache and replace the snapshot file.
    pub async fn save(&self) -> Result<()> {
        let bytes = self.cache.export_encrypted_backup().await?;
        write_atomic(&self.snapshot, &bytes)
            .with_context(|| format!("Failed to write snapshot {}", self.snapshot.display()))?;
        debug!(bytes = bytes.len(), path = %self.snapshot.display(), "saved snapshot");
        Ok(())
    }

    /// Rotate the key and save the snapshot under it.
    ///
    /// The new key reaches the key file before the snapshot is written. If
    /// that write fails the previous key is put back, so the key file always
    /// matches the snapshot on disk.
    pub async fn rotate_key(&self) -> Result<RotationSummary> {
        let previous = self
            .key_store
            .load()
            .with_context(|| format!("Failed to read {}", self.key_store.path().display()))?;
        let summary = self.cache.rotate_encryption_key().await?;

        if let Err(err) = self.save().await {
            if let Some(material) = previous {
                self.key_store.save(&material).with_context(|| {
                    format!("{err:#}; restoring the previous key also failed")
                })?;
                warn!(path = %self.key_store.path().display(), "restored previous encryption key");
            }
            return Err(err.context("Key rotation rolled back"));
        }
        Ok(summary)
    }
}

/// Snapshot bytes, or `None` when the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    Ok(Some(bytes))
}

/// Decode a snapshot file without opening any entry.
pub fn read_backup(path: &Path) -> Result<Option<Backup>> {
    read_snapshot(path)?
        .map(|bytes| {
            Backup::decode(&bytes)
                .with_context(|| format!("Failed to decode snapshot {}", path.display()))
        })
        .transpose()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    // Created 0600 on Unix.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
