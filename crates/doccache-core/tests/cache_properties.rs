//! End-to-end properties of `DocumentCache` through its public API.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, TimeZone, Utc};
use doccache_core::{
    AnalysisResponse, Backup, CacheCategory, CacheConfig, CachedValue, DocumentCache, DocumentType,
    EncryptionKeyMaterial, EncryptionLayer, Error, GeneratedDocument, MemoryKeyStore,
    MemoryPressureLevel, StaticMemorySampler,
};
use proptest::prelude::*;
use std::time::Duration;

const SOW: CacheCategory = CacheCategory::Document(DocumentType::Sow);

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn document(content: &str) -> GeneratedDocument {
    let mut doc = GeneratedDocument::new(DocumentType::Sow, content);
    doc.created_at = fixed_time();
    doc
}

fn build(config: CacheConfig, sampler: StaticMemorySampler) -> DocumentCache {
    DocumentCache::builder()
        .config(config)
        .memory_sampler(sampler)
        .background_resizing(false)
        .build()
        .unwrap()
}

fn all_configurations() -> Vec<CacheConfig> {
    let mut configs = Vec::new();
    for encryption in [false, true] {
        for adaptive in [false, true] {
            let mut config = CacheConfig::standard();
            config.encryption_enabled = encryption;
            config.adaptive_sizing_enabled = adaptive;
            configs.push(config);
        }
    }
    configs
}

/// Rewrite one record of an exported snapshot.
fn tamper(snapshot: &[u8], edit: impl FnOnce(&mut doccache_core::CacheEntry)) -> Vec<u8> {
    let mut backup = Backup::decode(snapshot).unwrap();
    edit(&mut backup.records[0].entry);
    backup.encode().unwrap()
}

#[tokio::test]
async fn basic_hit_returns_cached_sow() {
    let cache = build(CacheConfig::secure(), StaticMemorySampler::at_percent(20));
    let value = CachedValue::from(document("SOW text"));

    cache.cache_value(SOW, "Build a website", &value).await.unwrap();
    let hit = cache.get_cached_value(SOW, "Build a website").await.unwrap();

    match hit {
        Some(CachedValue::Document(doc)) => assert_eq!(doc.content, "SOW text"),
        other => panic!("expected document hit, got {other:?}"),
    }
}

#[tokio::test]
async fn round_trip_in_every_configuration() {
    let analysis = CachedValue::from(AnalysisResponse {
        response: "Use a firm-fixed-price PWS".into(),
        recommended_documents: vec![DocumentType::Pws, DocumentType::Qasp],
    });
    for config in all_configurations() {
        let label = format!(
            "encryption={} adaptive={}",
            config.encryption_enabled, config.adaptive_sizing_enabled
        );
        let cache = build(config, StaticMemorySampler::at_percent(20));
        let doc = CachedValue::from(document("body ✓ with unicode"));

        cache.cache_value(SOW, "Requirement", &doc).await.unwrap();
        cache.cache_value(CacheCategory::Analysis, "Requirement", &analysis).await.unwrap();

        assert_eq!(cache.get_cached_value(SOW, " requirement ").await.unwrap(), Some(doc), "{label}");
        assert_eq!(
            cache.get_cached_value(CacheCategory::Analysis, "REQUIREMENT").await.unwrap(),
            Some(analysis.clone()),
            "{label}"
        );
        cache.shutdown().await;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn round_trip_for_arbitrary_requirements(
        requirement in "\\PC{0,400}",
        content in "\\PC{0,2000}",
        encrypted in any::<bool>(),
        adaptive in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let mut config = CacheConfig::standard();
        config.encryption_enabled = encrypted;
        config.adaptive_sizing_enabled = adaptive;

        let fetched = runtime.block_on(async {
            let cache = build(config, StaticMemorySampler::at_percent(20));
            let value = CachedValue::from(document(&content));
            cache.cache_value(SOW, &requirement, &value).await.unwrap();
            cache.get_cached_value(SOW, &requirement).await.unwrap()
        });
        prop_assert_eq!(fetched, Some(CachedValue::from(document(&content))));
    }
}

#[tokio::test]
async fn single_bit_flips_in_ciphertext_are_misses_and_purge() {
    let store = MemoryKeyStore::new();
    let cache = DocumentCache::builder()
        .config(CacheConfig::secure())
        .key_store(store)
        .background_resizing(false)
        .build()
        .unwrap();
    cache.cache_value(SOW, "Build a website", &CachedValue::from(document("SOW text"))).await.unwrap();
    let snapshot = cache.export_encrypted_backup().await.unwrap();
    let ciphertext_len = Backup::decode(&snapshot).unwrap().records[0].entry.ciphertext.len();

    for bit in 0..ciphertext_len * 8 {
        let tampered = tamper(&snapshot, |entry| entry.ciphertext[bit / 8] ^= 1 << (bit % 8));
        cache.import_encrypted_backup(&tampered).await.unwrap();

        assert_eq!(cache.get_cached_value(SOW, "Build a website").await.unwrap(), None, "bit {bit}");
        assert_eq!(cache.get_cache_statistics().await.item_count, 0, "bit {bit}");
        assert_eq!(cache.get_cached_value(SOW, "Build a website").await.unwrap(), None, "bit {bit}");
    }

    let stats = cache.get_cache_statistics().await;
    assert_eq!(stats.integrity_failures, (ciphertext_len * 8) as u64);
}

#[tokio::test]
async fn checksum_tampering_is_detected_with_and_without_encryption() {
    for config in [CacheConfig::standard(), CacheConfig::secure()] {
        let cache = build(config, StaticMemorySampler::at_percent(20));
        cache.cache_value(SOW, "req", &CachedValue::from(document("text"))).await.unwrap();
        let snapshot = cache.export_encrypted_backup().await.unwrap();

        let tampered = tamper(&snapshot, |entry| {
            let flipped = if entry.checksum.starts_with('a') { "b" } else { "a" };
            entry.checksum.replace_range(0..1, flipped);
        });
        cache.import_encrypted_backup(&tampered).await.unwrap();

        assert_eq!(cache.get_cached_value(SOW, "req").await.unwrap(), None);
        assert_eq!(cache.get_cached_value(SOW, "req").await.unwrap(), None);
        let stats = cache.get_cache_statistics().await;
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.integrity_failures, 1);
    }
}

#[tokio::test]
async fn plaintext_tampering_is_detected_without_encryption() {
    let cache = build(CacheConfig::standard(), StaticMemorySampler::at_percent(20));
    cache.cache_value(SOW, "req", &CachedValue::from(document("text"))).await.unwrap();
    let snapshot = cache.export_encrypted_backup().await.unwrap();

    let tampered = tamper(&snapshot, |entry| {
        let last = entry.ciphertext.len() - 2;
        entry.ciphertext[last] ^= 0x01;
    });
    cache.import_encrypted_backup(&tampered).await.unwrap();
    assert_eq!(cache.get_cached_value(SOW, "req").await.unwrap(), None);
    assert_eq!(cache.get_cache_statistics().await.item_count, 0);
}

#[tokio::test]
async fn older_and_less_used_entry_is_evicted_first() {
    let mut config = CacheConfig::standard();
    config.max_items = 2;
    let cache = build(config, StaticMemorySampler::at_percent(20));

    cache.cache_value(SOW, "a", &CachedValue::from(document("same size"))).await.unwrap();
    cache.cache_value(SOW, "b", &CachedValue::from(document("same size"))).await.unwrap();
    for _ in 0..3 {
        assert!(cache.get_cached_value(SOW, "a").await.unwrap().is_some());
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.cache_value(SOW, "c", &CachedValue::from(document("same size"))).await.unwrap();

    assert!(cache.get_cached_value(SOW, "a").await.unwrap().is_some());
    assert!(cache.get_cached_value(SOW, "b").await.unwrap().is_none());
    assert!(cache.get_cached_value(SOW, "c").await.unwrap().is_some());
    assert_eq!(cache.get_cache_statistics().await.evictions, 1);
}

#[tokio::test]
async fn over_capacity_inserts_evict_exactly_the_excess() {
    let cache = build(CacheConfig::performance(), StaticMemorySampler::at_percent(20));

    for i in 0..60 {
        let value = CachedValue::from(document(&format!("document {i:02}")));
        cache.cache_value(SOW, &format!("requirement {i}"), &value).await.unwrap();
    }

    let stats = cache.get_cache_statistics().await;
    assert_eq!(stats.item_count, 50);
    assert_eq!(stats.evictions, 10);
    let metrics = cache.get_adaptive_metrics().await.unwrap();
    assert_eq!(metrics.current_limits.max_item_count, 50);
    assert_eq!(metrics.actual_usage.item_count, 50);
}

#[tokio::test]
async fn urgent_pressure_halves_item_limit() {
    let cache = build(CacheConfig::performance(), StaticMemorySampler::at_percent(85));

    let metrics = cache.get_adaptive_metrics().await.unwrap();
    assert_eq!(metrics.pressure_level, MemoryPressureLevel::Urgent);
    assert_eq!(metrics.current_limits.max_item_count, 25);
    assert_eq!(metrics.current_limits.max_total_bytes, 50 * 1024 * 1024);
}

#[tokio::test]
async fn warning_pressure_floors_fractional_limits() {
    let cache = build(CacheConfig::performance(), StaticMemorySampler::at_percent(75));
    let limits = cache.adjust_cache_limits().await;
    assert_eq!(limits.max_item_count, 37);
}

#[tokio::test]
async fn sustained_high_hit_rate_grows_limits_to_hard_cap() {
    let sampler = StaticMemorySampler::at_percent(20);
    let cache = build(CacheConfig::performance(), sampler);
    cache.cache_value(SOW, "hot", &CachedValue::from(document("x"))).await.unwrap();
    for _ in 0..50 {
        cache.get_cached_value(SOW, "hot").await.unwrap();
    }

    // First sample from construction had no history; outvote it.
    for _ in 0..5 {
        cache.get_cached_value(SOW, "hot").await.unwrap();
        cache.adjust_cache_limits().await;
    }
    let metrics = cache.get_adaptive_metrics().await.unwrap();
    assert!(metrics.hit_rate > 0.8, "window hit rate {}", metrics.hit_rate);
    assert_eq!(metrics.current_limits.max_item_count, 100);
}

#[tokio::test]
async fn key_rotation_preserves_all_entries() {
    let store = MemoryKeyStore::new();
    let cache = DocumentCache::builder()
        .config(CacheConfig::secure())
        .key_store(store.clone())
        .background_resizing(false)
        .build()
        .unwrap();
    for i in 0..10 {
        let value = CachedValue::from(document(&format!("content {i}")));
        cache.cache_value(SOW, &format!("req {i}"), &value).await.unwrap();
    }
    let old_material: EncryptionKeyMaterial = store.peek().unwrap();

    let summary = cache.rotate_encryption_key().await.unwrap();
    assert_eq!(summary.reencrypted, 10);
    assert_eq!(summary.purged, 0);
    assert_ne!(store.peek().unwrap(), old_material);

    for i in 0..10 {
        let value = cache.get_cached_value(SOW, &format!("req {i}")).await.unwrap();
        assert_eq!(value, Some(CachedValue::from(document(&format!("content {i}")))));
    }

    let old_layer = EncryptionLayer::new(old_material).unwrap();
    let backup = Backup::decode(&cache.export_encrypted_backup().await.unwrap()).unwrap();
    assert_eq!(backup.records.len(), 10);
    for record in &backup.records {
        let attempt = old_layer.decrypt(
            &record.entry.ciphertext,
            &record.entry.nonce,
            &record.key.associated_data(),
        );
        assert!(matches!(attempt, Err(Error::DecryptionFailed)));
    }
}

#[tokio::test]
async fn snapshot_from_before_rotation_is_rejected() {
    let cache = build(CacheConfig::secure(), StaticMemorySampler::at_percent(20));
    cache.cache_value(SOW, "req", &CachedValue::from(document("text"))).await.unwrap();
    let before = cache.export_encrypted_backup().await.unwrap();
    cache.rotate_encryption_key().await.unwrap();

    assert!(matches!(cache.import_encrypted_backup(&before).await, Err(Error::Backup(_))));
    assert!(cache.get_cached_value(SOW, "req").await.unwrap().is_some());
}

#[tokio::test]
async fn import_replaces_store_wholesale() {
    let cache = build(CacheConfig::secure(), StaticMemorySampler::at_percent(20));
    cache.cache_value(SOW, "one", &CachedValue::from(document("1"))).await.unwrap();
    let snapshot = cache.export_encrypted_backup().await.unwrap();

    cache.cache_value(SOW, "two", &CachedValue::from(document("2"))).await.unwrap();
    assert_eq!(cache.import_encrypted_backup(&snapshot).await.unwrap(), 1);

    assert!(cache.get_cached_value(SOW, "one").await.unwrap().is_some());
    assert!(cache.get_cached_value(SOW, "two").await.unwrap().is_none());

    assert!(cache.import_encrypted_backup(b"{\"garbage\":true}").await.is_err());
    assert!(cache.get_cached_value(SOW, "one").await.unwrap().is_some());
}

#[tokio::test]
async fn imported_extreme_access_metadata_does_not_panic() {
    // Given: a snapshot whose two same-category records carry maximal counters
    let cache = build(CacheConfig::secure(), StaticMemorySampler::at_percent(20));
    cache.cache_value(SOW, "one", &CachedValue::from(document("1"))).await.unwrap();
    cache.cache_value(SOW, "two", &CachedValue::from(document("2"))).await.unwrap();
    let mut backup = Backup::decode(&cache.export_encrypted_backup().await.unwrap()).unwrap();
    for record in &mut backup.records {
        record.entry.access_count = u64::MAX;
        record.entry.avg_retrieval_latency = Duration::MAX;
    }
    cache.import_encrypted_backup(&backup.encode().unwrap()).await.unwrap();

    // When: an entry is read and statistics are gathered
    let hit = cache.get_cached_value(SOW, "one").await.unwrap();
    let stats = cache.get_cache_statistics().await;

    // Then: the counters saturate
    assert!(hit.is_some());
    assert_eq!(stats.top_categories[0].access_count, u64::MAX);
}
