//! # doccache-core
//!
//! An adaptive, encrypted, in-process cache for generated documents and
//! requirement analyses.
//!
//! Generated documents are expensive to recompute and sensitive enough to be
//! encrypted at rest. This crate keeps them in a single-process cache that
//! seals every value with AES-256-GCM, verifies a SHA-256 checksum on every
//! read, resizes itself as host memory pressure and hit rates change, and
//! evicts by a weighted score instead of plain LRU.
//!
//! ## Architecture
//!
//! - **Keys**: [`KeyNormalizer`] turns `(category, requirement text)` into a
//!   stable [`CacheKey`]
//! - **Encryption**: [`EncryptionLayer`] seals and opens payloads and rotates
//!   keys; [`KeyStore`] persists key material
//! - **Storage**: [`store::EntryStore`] holds entries and byte totals
//! - **Sizing**: [`MemorySampler`] and [`classify`] produce a
//!   [`MemoryPressureLevel`]; [`AdaptiveSizingEngine`] turns it into
//!   [`AdaptiveLimits`]
//! - **Eviction**: [`eviction::enforce`] removes the highest-scoring entries
//!   until the limits hold
//! - **Metrics**: [`MetricsCollector`] keeps lifetime counters
//! - **Facade**: [`DocumentCache`] composes all of the above
//!
//! ## Quick Start
//!
//! ```rust
//! use doccache_core::{CacheCategory, CacheConfig, CachedValue, DocumentCache, DocumentType,
//!     GeneratedDocument};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> doccache_core::Result<()> {
//! let cache = DocumentCache::new(CacheConfig::performance())?;
//! let sow = CacheCategory::Document(DocumentType::Sow);
//! let value = CachedValue::from(GeneratedDocument::new(DocumentType::Sow, "SOW text"));
//!
//! cache.cache_value(sow, "Build a website", &value).await?;
//! assert_eq!(cache.get_cached_value(sow, "Build a website").await?, Some(value));
//! assert_eq!(cache.get_cached_value(sow, "Build an app").await?, None);
//!
//! let stats = cache.get_cache_statistics().await;
//! println!("{} items, hit rate {:.2}", stats.item_count, stats.hit_rate);
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Reads never fail because an entry was tampered with or sealed under
//! another key; those entries are purged and reported as misses. Errors are
//! reserved for serialization bugs, misconfiguration and misuse:
//!
//! ```rust
//! use doccache_core::{CacheConfig, DocumentCache, Error};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> doccache_core::Result<()> {
//! let cache = DocumentCache::new(CacheConfig::standard())?;
//! match cache.rotate_encryption_key().await {
//!     Err(Error::EncryptionNotEnabled) => {},
//!     other => panic!("unexpected: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

/// Adaptive sizing engine and limits
pub mod adaptive;
/// Encrypted backup snapshot format
pub mod backup;
/// The cache facade
pub mod cache;
/// Configuration loading, presets and overrides
pub mod config;
/// AEAD encryption and key rotation
pub mod crypto;
/// Error types and result aliases
pub mod error;
/// Weighted eviction scoring and enforcement
pub mod eviction;
/// Cache key normalization
pub mod key;
/// Persistence for encryption keys
pub mod key_store;
/// Operation counters and rates
pub mod metrics;
/// Memory sampling and pressure classification
pub mod pressure;
/// Entry storage
pub mod store;
/// Cached value types and categories
pub mod types;

// Re-export commonly used types
pub use adaptive::{
    AdaptiveLimits, AdaptiveSizingEngine, LimitAdjustment, MetricsWindow, RateSample,
    SizingPolicy,
};
pub use backup::{BACKUP_FORMAT_VERSION, Backup, BackupHeader, BackupRecord};
pub use cache::{
    AdaptiveMetrics, CacheStatistics, CacheUsage, CategoryUsage, DocumentCache,
    DocumentCacheBuilder, RotationSummary,
};
pub use config::{AdaptiveConfig, CacheConfig, KeyConfig};
pub use crypto::{EncryptionKeyMaterial, EncryptionLayer, SealedPayload, sha256_hex};
pub use error::{Error, Result};
pub use key::{CacheKey, KeyNormalizer};
pub use key_store::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use metrics::{MetricsCollector, MetricsSnapshot, OperationKind};
pub use pressure::{
    MemoryInfo, MemoryPressureLevel, MemorySampler, SamplerScope, StaticMemorySampler,
    SystemMemorySampler, classify,
};
pub use store::CacheEntry;
pub use types::*;
