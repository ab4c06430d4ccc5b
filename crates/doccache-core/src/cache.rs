//! The public cache.
//!
//! [`DocumentCache`] composes the key normalizer, encryption layer, entry
//! store, adaptive sizing engine, eviction scorer and metrics collector behind
//! one configuration. All store mutation goes through a single
//! `tokio::sync::Mutex`; metrics are lock-free and shared separately.
//!
//! ```rust
//! use doccache_core::{CacheConfig, DocumentCache, DocumentType, GeneratedDocument};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> doccache_core::Result<()> {
//! let cache = DocumentCache::builder()
//!     .config(CacheConfig::secure())
//!     .build()?;
//!
//! let doc = GeneratedDocument::new(DocumentType::Sow, "SOW text");
//! cache.cache_document("Build a website", &doc).await?;
//!
//! let hit = cache.get_cached_document(DocumentType::Sow, "  build a WEBSITE ").await?;
//! assert_eq!(hit, Some(doc));
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adaptive::{AdaptiveLimits, AdaptiveSizingEngine, LimitAdjustment, RateSample};
use crate::backup::Backup;
use crate::config::CacheConfig;
use crate::crypto::EncryptionLayer;
use crate::eviction;
use crate::key::KeyNormalizer;
use crate::key_store::{KeyStore, MemoryKeyStore};
use crate::metrics::{MetricsCollector, OperationKind};
use crate::pressure::{MemoryPressureLevel, MemorySampler, SystemMemorySampler};
use crate::store::{CacheEntry, EntryStore};
use crate::types::{AnalysisResponse, CacheCategory, CachedValue, DocumentType, GeneratedDocument};
use crate::{EncryptionKeyMaterial, Error, Result};

/// Number of categories reported in [`CacheStatistics::top_categories`].
const TOP_CATEGORIES: usize = 3;

/// Access totals for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUsage {
    /// Category being ranked.
    pub category: CacheCategory,
    /// Summed access count of its entries.
    pub access_count: u64,
}

/// Read-only snapshot returned by [`DocumentCache::get_cache_statistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    /// Entries currently stored.
    pub item_count: usize,
    /// Entries holding documents.
    pub document_count: usize,
    /// Entries holding analysis responses.
    pub analysis_count: usize,
    /// Stored payload bytes.
    pub byte_size: u64,
    /// Hits over reads, integrity failures counted as misses.
    pub hit_rate: f64,
    /// Mean time to serve a read.
    pub average_latency: Duration,
    /// Entries evicted since construction.
    pub evictions: u64,
    /// Reads dropped for failing decryption or checksum verification.
    pub integrity_failures: u64,
    /// Last eviction sweep or clear.
    pub last_cleanup: Option<DateTime<Utc>>,
    /// Most accessed categories, highest first.
    pub top_categories: Vec<CategoryUsage>,
    /// Whether entries are sealed.
    pub encrypted: bool,
}

/// Current size of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheUsage {
    /// Entries stored.
    pub item_count: usize,
    /// Stored payload bytes.
    pub total_bytes: u64,
}

/// Output of the adaptive sizing engine, from
/// [`DocumentCache::get_adaptive_metrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveMetrics {
    /// Limits in force.
    pub current_limits: AdaptiveLimits,
    /// Current size of the store.
    pub actual_usage: CacheUsage,
    /// Pressure level at the last recomputation.
    pub pressure_level: MemoryPressureLevel,
    /// Window mean used for the last recomputation.
    pub hit_rate: f64,
    /// Window mean used for the last recomputation.
    pub eviction_rate: f64,
    /// Recomputations since construction.
    pub adjustment_count: u64,
}

/// Result of [`DocumentCache::rotate_encryption_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationSummary {
    /// Entries sealed under the new key.
    pub reencrypted: usize,
    /// Entries that could not be opened under the old key and were dropped.
    pub purged: usize,
}

struct CacheState {
    config: CacheConfig,
    normalizer: KeyNormalizer,
    store: EntryStore,
    encryption: Option<EncryptionLayer>,
    engine: AdaptiveSizingEngine,
}

impl CacheState {
    fn limits(&self) -> AdaptiveLimits {
        if self.config.adaptive_sizing_enabled {
            self.engine.current_limits()
        } else {
            self.config.base_limits()
        }
    }

    fn enforce(&mut self, metrics: &MetricsCollector) {
        let limits = self.limits();
        let outcome = eviction::enforce(&mut self.store, &limits, Utc::now());
        metrics.record_evictions(outcome.evicted.len());
    }

    /// Recompute adaptive limits and enforce them if they shrank. No-op when
    /// adaptive sizing is off.
    fn recompute_limits(
        &mut self,
        sampler: &dyn MemorySampler,
        metrics: &MetricsCollector,
    ) -> Option<LimitAdjustment> {
        if !self.config.adaptive_sizing_enabled {
            return None;
        }
        let sample = RateSample {
            hit_rate: metrics.hit_rate(),
            eviction_rate: metrics.eviction_rate(),
            observations: metrics.observations(),
        };
        let adjustment = self.engine.recompute(sampler.pressure(), sample, Instant::now());
        if adjustment.changed() {
            info!(
                level = %adjustment.level,
                max_items = adjustment.current.max_item_count,
                max_bytes = adjustment.current.max_total_bytes,
                "adaptive cache limits changed"
            );
        } else {
            debug!(level = %adjustment.level, "adaptive cache limits unchanged");
        }
        if adjustment.tightened() {
            self.enforce(metrics);
        }
        Some(adjustment)
    }
}

struct ResizeTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Adaptive, optionally encrypted cache of generated documents and analyses.
///
/// Construct once and share (for example behind an `Arc`). The background
/// resize task, when running, is stopped by [`DocumentCache::shutdown`] or
/// aborted on drop.
pub struct DocumentCache {
    state: Arc<Mutex<CacheState>>,
    metrics: Arc<MetricsCollector>,
    sampler: Arc<dyn MemorySampler>,
    key_store: Arc<dyn KeyStore>,
    resize_task: StdMutex<Option<ResizeTask>>,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DocumentCache`].
pub struct DocumentCacheBuilder {
    config: CacheConfig,
    key_store: Option<Arc<dyn KeyStore>>,
    sampler: Option<Arc<dyn MemorySampler>>,
    background_resizing: bool,
}

impl Default for DocumentCacheBuilder {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            key_store: None,
            sampler: None,
            background_resizing: true,
        }
    }
}

impl DocumentCacheBuilder {
    /// Configuration to start from. Defaults to [`CacheConfig::default`].
    #[must_use]
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Where key material is loaded from and saved to. Defaults to an
    /// in-process [`MemoryKeyStore`], so the key lives as long as the process.
    #[must_use]
    pub fn key_store(mut self, key_store: impl KeyStore + 'static) -> Self {
        self.key_store = Some(Arc::new(key_store));
        self
    }

    /// Memory source for pressure classification. Defaults to
    /// [`SystemMemorySampler`].
    #[must_use]
    pub fn memory_sampler(mut self, sampler: impl MemorySampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Run the periodic resize task. On by default; it is only spawned when
    /// a Tokio runtime is available.
    #[must_use]
    pub const fn background_resizing(mut self, enabled: bool) -> Self {
        self.background_resizing = enabled;
        self
    }

    /// Validate the configuration, load or generate the key, and start the resize task.
    pub fn build(self) -> Result<DocumentCache> {
        self.config.validate()?;
        let key_store = self
            .key_store
            .unwrap_or_else(|| Arc::new(MemoryKeyStore::new()));
        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(SystemMemorySampler::default()));
        let metrics = Arc::new(MetricsCollector::new(self.config.enable_metrics));

        let encryption = if self.config.encryption_enabled {
            Some(load_or_generate_layer(key_store.as_ref())?)
        } else {
            None
        };

        let mut state = CacheState {
            normalizer: KeyNormalizer::new(self.config.keys.requirement_prefix_chars),
            store: EntryStore::new(),
            encryption,
            engine: AdaptiveSizingEngine::new(
                self.config.sizing_policy(),
                self.config.adaptive.window_size,
                self.config.check_interval(),
            ),
            config: self.config,
        };
        state.recompute_limits(sampler.as_ref(), &metrics);

        let state = Arc::new(Mutex::new(state));
        let resize_task = if self.background_resizing {
            spawn_resize_task(&state, &metrics, &sampler)
        } else {
            None
        };

        Ok(DocumentCache {
            state,
            metrics,
            sampler,
            key_store,
            resize_task: StdMutex::new(resize_task),
        })
    }
}

fn load_or_generate_layer(key_store: &dyn KeyStore) -> Result<EncryptionLayer> {
    let material = if let Some(material) = key_store.load()? {
        debug!("using persisted encryption key");
        material
    } else {
        let material = EncryptionKeyMaterial::generate()?;
        key_store.save(&material)?;
        info!("generated new encryption key");
        material
    };
    EncryptionLayer::new(material)
}

fn spawn_resize_task(
    state: &Arc<Mutex<CacheState>>,
    metrics: &Arc<MetricsCollector>,
    sampler: &Arc<dyn MemorySampler>,
) -> Option<ResizeTask> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let state = Arc::clone(state);
    let metrics = Arc::clone(metrics);
    let sampler = Arc::clone(sampler);

    let handle = runtime.spawn(async move {
        loop {
            let period = state.lock().await.engine.interval();
            tokio::select! {
                () = tokio::time::sleep(period) => {
                    let mut guard = state.lock().await;
                    guard.recompute_limits(sampler.as_ref(), &metrics);
                },
                _ = shutdown_rx.changed() => break,
            }
        }
        debug!("adaptive resize task stopped");
    });

    Some(ResizeTask { shutdown, handle })
}

impl DocumentCache {
    /// Builder with default configuration.
    #[must_use]
    pub fn builder() -> DocumentCacheBuilder {
        DocumentCacheBuilder::default()
    }

    /// Cache with `config`, an in-process key store and the system memory
    /// sampler.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Store `value` under `(category, requirement)`, replacing any previous
    /// value.
    ///
    /// Only serialization failures are returned. A failure to seal the value
    /// is logged and the write is skipped.
    pub async fn cache_value(
        &self,
        category: CacheCategory,
        requirement: &str,
        value: &CachedValue,
    ) -> Result<()> {
        let started = Instant::now();
        let plaintext = match value.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.metrics.record(OperationKind::Error, started.elapsed(), 0);
                return Err(err);
            },
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.config.adaptive_sizing_enabled && state.engine.is_due(Instant::now()) {
            state.recompute_limits(self.sampler.as_ref(), &self.metrics);
        }

        let key = state.normalizer.normalize(category, requirement);
        let entry = match CacheEntry::seal(&plaintext, state.encryption.as_ref(), &key, Utc::now()) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to seal cache entry; skipping write");
                self.metrics.record(OperationKind::Error, started.elapsed(), 0);
                return Ok(());
            },
        };
        state.store.insert(key, entry);
        state.enforce(&self.metrics);

        self.metrics
            .record(OperationKind::Write, started.elapsed(), plaintext.len());
        Ok(())
    }

    /// Look up `(category, requirement)`.
    ///
    /// Entries that fail authentication or their checksum are purged and
    /// reported as a miss.
    pub async fn get_cached_value(
        &self,
        category: CacheCategory,
        requirement: &str,
    ) -> Result<Option<CachedValue>> {
        let started = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let key = state.normalizer.normalize(category, requirement);

        let Some(entry) = state.store.get(&key) else {
            self.metrics.record(OperationKind::Miss, started.elapsed(), 0);
            return Ok(None);
        };

        let plaintext = match entry.open(state.encryption.as_ref(), &key) {
            Ok(plaintext) => plaintext,
            Err(err) if err.is_degraded_read() => {
                warn!(key = %key, error = %err, "purging unreadable cache entry");
                state.store.remove(&key);
                self.metrics.record_integrity_failure(started.elapsed());
                return Ok(None);
            },
            Err(err) => {
                self.metrics.record(OperationKind::Error, started.elapsed(), 0);
                return Err(err);
            },
        };

        let value = match CachedValue::from_bytes(&plaintext) {
            Ok(value) => value,
            Err(err) => {
                self.metrics.record(OperationKind::Error, started.elapsed(), 0);
                return Err(err);
            },
        };

        let latency = started.elapsed();
        state.store.touch(&key, Utc::now(), latency);
        self.metrics.record(OperationKind::Hit, latency, plaintext.len());
        Ok(Some(value))
    }

    /// Cache a generated document under its type.
    pub async fn cache_document(&self, requirement: &str, document: &GeneratedDocument) -> Result<()> {
        self.cache_value(
            document.document_type.into(),
            requirement,
            &CachedValue::Document(document.clone()),
        )
        .await
    }

    /// Read a document of `document_type`, if cached.
    pub async fn get_cached_document(
        &self,
        document_type: DocumentType,
        requirement: &str,
    ) -> Result<Option<GeneratedDocument>> {
        Ok(
            match self.get_cached_value(document_type.into(), requirement).await? {
                Some(CachedValue::Document(document)) => Some(document),
                _ => None,
            },
        )
    }

    /// Cache an analysis response.
    pub async fn cache_analysis_response(
        &self,
        requirement: &str,
        response: &AnalysisResponse,
    ) -> Result<()> {
        self.cache_value(
            CacheCategory::Analysis,
            requirement,
            &CachedValue::Analysis(response.clone()),
        )
        .await
    }

    /// Read an analysis response, if cached.
    pub async fn get_cached_analysis_response(
        &self,
        requirement: &str,
    ) -> Result<Option<AnalysisResponse>> {
        Ok(
            match self.get_cached_value(CacheCategory::Analysis, requirement).await? {
                Some(CachedValue::Analysis(response)) => Some(response),
                _ => None,
            },
        )
    }

    /// Drop every entry and reset metrics. The encryption key is kept.
    pub async fn clear_cache(&self) {
        let mut state = self.state.lock().await;
        let removed = state.store.len();
        state.store.clear(Utc::now());
        state.engine.reset_window();
        self.metrics.reset();
        info!(removed, "cache cleared");
    }

    /// Point-in-time statistics.
    pub async fn get_cache_statistics(&self) -> CacheStatistics {
        let state = self.state.lock().await;
        let snapshot = self.metrics.snapshot();
        let (document_count, analysis_count) = state.store.category_counts();
        CacheStatistics {
            item_count: state.store.len(),
            document_count,
            analysis_count,
            byte_size: state.store.total_bytes(),
            hit_rate: snapshot.hit_rate,
            average_latency: snapshot.average_retrieval_latency,
            evictions: snapshot.evictions,
            integrity_failures: snapshot.integrity_failures,
            last_cleanup: state.store.last_cleanup(),
            top_categories: state
                .store
                .top_categories(TOP_CATEGORIES)
                .into_iter()
                .map(|(category, access_count)| CategoryUsage {
                    category,
                    access_count,
                })
                .collect(),
            encrypted: state.encryption.is_some(),
        }
    }

    /// Latest adaptive sizing output, or `None` when adaptive sizing is off.
    pub async fn get_adaptive_metrics(&self) -> Option<AdaptiveMetrics> {
        let state = self.state.lock().await;
        if !state.config.adaptive_sizing_enabled {
            return None;
        }
        Some(AdaptiveMetrics {
            current_limits: state.engine.current_limits(),
            actual_usage: CacheUsage {
                item_count: state.store.len(),
                total_bytes: state.store.total_bytes(),
            },
            pressure_level: state.engine.pressure_level(),
            hit_rate: state.engine.window().mean_hit_rate(),
            eviction_rate: state.engine.window().mean_eviction_rate(),
            adjustment_count: state.engine.adjustment_count(),
        })
    }

    /// Recompute adaptive limits now and enforce them. Returns the limits in
    /// effect afterwards.
    pub async fn adjust_cache_limits(&self) -> AdaptiveLimits {
        let mut state = self.state.lock().await;
        state.recompute_limits(self.sampler.as_ref(), &self.metrics);
        state.enforce(&self.metrics);
        state.limits()
    }

    /// Re-encrypt every entry under a fresh key.
    ///
    /// Holds the store lock for the whole rotation. If the new key cannot be
    /// persisted the rotation is abandoned and the old key stays active.
    pub async fn rotate_encryption_key(&self) -> Result<RotationSummary> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let layer = state.encryption.as_ref().ok_or(Error::EncryptionNotEnabled)?;

        let rotation = layer.rotate(state.store.entries())?;
        self.key_store.save(rotation.layer.material())?;

        let summary = RotationSummary {
            reencrypted: rotation.entries.len(),
            purged: rotation.purged.len(),
        };
        state.store.replace_all(rotation.entries);
        state.encryption = Some(rotation.layer);
        info!(
            reencrypted = summary.reencrypted,
            purged = summary.purged,
            "rotated encryption key"
        );
        Ok(summary)
    }

    /// Serialize the whole store. Entries stay sealed.
    pub async fn export_encrypted_backup(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        let salt = state.encryption.as_ref().map(|layer| layer.derivation_salt().as_slice());
        let backup = Backup::new(state.store.iter(), state.encryption.is_some(), salt);
        let bytes = backup.encode()?;
        info!(records = backup.records.len(), bytes = bytes.len(), "exported cache backup");
        Ok(bytes)
    }

    /// Replace the store with a snapshot. Either every record is taken or the
    /// store is left untouched. Returns the number of records imported.
    pub async fn import_encrypted_backup(&self, bytes: &[u8]) -> Result<usize> {
        let backup = Backup::decode(bytes)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if backup.header.encrypted != state.encryption.is_some() {
            return Err(Error::Backup(format!(
                "snapshot encryption mode ({}) does not match the cache ({})",
                backup.header.encrypted,
                state.encryption.is_some()
            )));
        }
        if let Some(layer) = &state.encryption {
            let salt = backup.header.salt_bytes()?;
            if salt.as_deref() != Some(layer.derivation_salt().as_slice()) {
                return Err(Error::Backup(
                    "snapshot was written under a different encryption key".into(),
                ));
            }
        }

        let imported = backup.records.len();
        state.store.replace_all(backup.into_entries());
        state.enforce(&self.metrics);
        info!(imported, retained = state.store.len(), "imported cache backup");
        Ok(imported)
    }

    /// Apply a new configuration.
    ///
    /// Switching encryption or adaptive sizing on or off needs an empty
    /// cache; otherwise [`Error::ConfigurationChangeRequiresClear`] is
    /// returned and nothing changes. Limit changes take effect immediately.
    pub async fn update_configuration(&self, config: CacheConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let encryption_changed = config.encryption_enabled != state.config.encryption_enabled;
        let adaptive_changed = config.adaptive_sizing_enabled != state.config.adaptive_sizing_enabled;
        if (encryption_changed || adaptive_changed) && !state.store.is_empty() {
            return Err(Error::ConfigurationChangeRequiresClear);
        }

        if encryption_changed {
            state.encryption = if config.encryption_enabled {
                Some(load_or_generate_layer(self.key_store.as_ref())?)
            } else {
                None
            };
        }

        state.normalizer = KeyNormalizer::new(config.keys.requirement_prefix_chars);
        state.engine.set_policy(config.sizing_policy());
        state.engine.set_interval(config.check_interval());
        state.engine.set_window_size(config.adaptive.window_size);
        self.metrics.set_enabled(config.enable_metrics);
        state.config = config;

        if adaptive_changed {
            state.recompute_limits(self.sampler.as_ref(), &self.metrics);
        }
        state.enforce(&self.metrics);
        info!(
            encryption = state.config.encryption_enabled,
            adaptive = state.config.adaptive_sizing_enabled,
            "cache configuration updated"
        );
        Ok(())
    }

    /// Active configuration.
    pub async fn configuration(&self) -> CacheConfig {
        self.state.lock().await.config.clone()
    }

    /// Purge entries idle longer than `idle_ttl_secs`, then recompute limits.
    /// Returns how many entries were purged.
    pub async fn optimize_for_memory(&self) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();
        let ttl = TimeDelta::from_std(state.config.idle_ttl()).unwrap_or(TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let purged = state.store.purge_idle(cutoff);
        if purged > 0 {
            state.store.mark_cleanup(now);
            self.metrics.record_evictions(purged);
        }
        state.recompute_limits(self.sampler.as_ref(), &self.metrics);
        state.enforce(&self.metrics);
        info!(purged, remaining = state.store.len(), "optimized cache for memory");
        purged
    }

    /// Stop the background resize task and wait for it to finish. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        let task = self
            .resize_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(err) = task.handle.await {
                warn!(error = %err, "adaptive resize task ended abnormally");
            }
        }
    }

    /// Whether the background resize task is running.
    #[must_use]
    pub fn has_background_task(&self) -> bool {
        self.resize_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for DocumentCache {
    fn drop(&mut self) {
        if let Some(task) = self
            .resize_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.handle.abort();
        }
    }
}
