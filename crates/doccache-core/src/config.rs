//! Configuration for a [`crate::DocumentCache`].
//!
//! Settings are plain TOML. The default file lives in the platform config
//! directory and is optional; a missing file yields [`CacheConfig::default`].
//! A handful of environment variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `DOCCACHE_ENCRYPTION` | `encryption_enabled` |
//! | `DOCCACHE_ADAPTIVE` | `adaptive_sizing_enabled` |
//! | `DOCCACHE_MAX_ITEMS` | `max_items` |
//! | `DOCCACHE_MAX_BYTES` | `max_bytes` |
//!
//! ## Examples
//!
//! ```rust
//! use doccache_core::CacheConfig;
//!
//! let config = CacheConfig::performance();
//! assert!(config.encryption_enabled && config.adaptive_sizing_enabled);
//! config.validate()?;
//!
//! let text = toml::to_string_pretty(&config)?;
//! let parsed: CacheConfig = toml::from_str(&text)?;
//! assert_eq!(parsed, config);
//! # Ok::<(), doccache_core::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adaptive::{AdaptiveLimits, DEFAULT_WINDOW_SIZE, SizingPolicy};
use crate::key::DEFAULT_REQUIREMENT_PREFIX_CHARS;
use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Overrides `encryption_enabled`.
pub const ENV_ENCRYPTION: &str = "DOCCACHE_ENCRYPTION";
/// Overrides `adaptive_sizing_enabled`.
pub const ENV_ADAPTIVE: &str = "DOCCACHE_ADAPTIVE";
/// Overrides `max_items`.
pub const ENV_MAX_ITEMS: &str = "DOCCACHE_MAX_ITEMS";
/// Overrides `max_bytes`.
pub const ENV_MAX_BYTES: &str = "DOCCACHE_MAX_BYTES";

/// Top-level cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seal every entry with AES-256-GCM.
    pub encryption_enabled: bool,
    /// Let memory pressure and hit rates move the limits.
    pub adaptive_sizing_enabled: bool,
    /// Base item limit.
    pub max_items: usize,
    /// Base byte limit.
    pub max_bytes: u64,
    /// Record operation metrics.
    pub enable_metrics: bool,
    /// Idle age after which `optimize_for_memory` purges an entry.
    pub idle_ttl_secs: u64,
    /// Adaptive sizing tuning.
    pub adaptive: AdaptiveConfig,
    /// Key normalization tuning.
    pub keys: KeyConfig,
}

/// Bounds and timing for adaptive sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Seconds between background recomputations.
    pub check_interval_secs: u64,
    /// Item limit never exceeded by boosting.
    pub hard_cap_items: usize,
    /// Byte limit never exceeded by boosting.
    pub hard_cap_bytes: u64,
    /// Smallest item limit under critical pressure.
    pub floor_items: usize,
    /// Smallest byte limit under critical pressure.
    pub floor_bytes: u64,
    /// Samples kept for rate averaging.
    pub window_size: usize,
}

/// Key derivation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Characters of the normalized requirement that take part in the key.
    pub requirement_prefix_chars: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            hard_cap_items: 100,
            hard_cap_bytes: 200 * MIB,
            floor_items: 10,
            floor_bytes: 10 * MIB,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            requirement_prefix_chars: DEFAULT_REQUIREMENT_PREFIX_CHARS,
        }
    }
}

impl CacheConfig {
    /// No encryption, fixed limits.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            encryption_enabled: false,
            adaptive_sizing_enabled: false,
            max_items: 50,
            max_bytes: 100 * MIB,
            enable_metrics: true,
            idle_ttl_secs: 3600,
            adaptive: AdaptiveConfig::default(),
            keys: KeyConfig::default(),
        }
    }

    /// Encryption on, adaptive sizing off.
    #[must_use]
    pub fn secure() -> Self {
        Self {
            encryption_enabled: true,
            ..Self::standard()
        }
    }

    /// Encryption and adaptive sizing on.
    #[must_use]
    pub fn performance() -> Self {
        Self {
            encryption_enabled: true,
            adaptive_sizing_enabled: true,
            ..Self::standard()
        }
    }

    /// Small limits with metrics off.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            max_items: 20,
            max_bytes: 50 * MIB,
            enable_metrics: false,
            ..Self::standard()
        }
    }

    /// Look a preset up by name.
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::standard()),
            "secure" => Ok(Self::secure()),
            "performance" => Ok(Self::performance()),
            "minimal" => Ok(Self::minimal()),
            other => Err(Error::Config(format!("unknown preset '{other}'"))),
        }
    }

    /// Configured limits as an [`AdaptiveLimits`].
    #[must_use]
    pub const fn base_limits(&self) -> AdaptiveLimits {
        AdaptiveLimits::new(self.max_items, self.max_bytes)
    }

    /// Sizing policy derived from the limits and adaptive settings.
    #[must_use]
    pub const fn sizing_policy(&self) -> SizingPolicy {
        SizingPolicy {
            base: self.base_limits(),
            hard_cap: AdaptiveLimits::new(self.adaptive.hard_cap_items, self.adaptive.hard_cap_bytes),
            floor: AdaptiveLimits::new(self.adaptive.floor_items, self.adaptive.floor_bytes),
        }
    }

    /// `check_interval_secs` as a [`Duration`].
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.adaptive.check_interval_secs)
    }

    /// `idle_ttl_secs` as a [`Duration`].
    #[must_use]
    pub const fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Reject zero limits, intervals, windows and prefixes.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_items", self.max_items as u64),
            ("max_bytes", self.max_bytes),
            ("adaptive.check_interval_secs", self.adaptive.check_interval_secs),
            ("adaptive.hard_cap_items", self.adaptive.hard_cap_items as u64),
            ("adaptive.hard_cap_bytes", self.adaptive.hard_cap_bytes),
            ("adaptive.floor_items", self.adaptive.floor_items as u64),
            ("adaptive.floor_bytes", self.adaptive.floor_bytes),
            ("adaptive.window_size", self.adaptive.window_size as u64),
            ("keys.requirement_prefix_chars", self.keys.requirement_prefix_chars as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Load `<config dir>/config.toml`, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Read and validate a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Platform config location:
    /// - Linux: `~/.config/doccache/config.toml`
    /// - macOS: `~/Library/Application Support/dev.outfitter.doccache/config.toml`
    /// - Windows: `%APPDATA%\outfitter\doccache\config\config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("dev", "outfitter", "doccache")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_ENCRYPTION) {
            self.encryption_enabled = parse_flag(ENV_ENCRYPTION, &value)?;
        }
        if let Some(value) = lookup(ENV_ADAPTIVE) {
            self.adaptive_sizing_enabled = parse_flag(ENV_ADAPTIVE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ITEMS) {
            self.max_items = parse_number(ENV_MAX_ITEMS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_BYTES) {
            self.max_bytes = parse_number(ENV_MAX_BYTES, &value)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{name}: expected a boolean, got '{other}'"))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name}: expected a number, got '{value}'")))
}
