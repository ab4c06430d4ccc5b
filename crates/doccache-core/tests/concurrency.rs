//! Concurrent access to a shared `DocumentCache`.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use doccache_core::{CacheConfig, DocumentCache, DocumentType, GeneratedDocument, StaticMemorySampler};

fn shared_cache(config: CacheConfig) -> Arc<DocumentCache> {
    Arc::new(
        DocumentCache::builder()
            .config(config)
            .memory_sampler(StaticMemorySampler::at_percent(20))
            .background_resizing(false)
            .build()
            .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_and_readers_see_their_own_values() {
    // Given: a secure cache large enough to hold every key
    let mut config = CacheConfig::secure();
    config.max_items = 200;
    let cache = shared_cache(config);

    // When: 8 tasks each write and read back 20 distinct requirements
    let mut handles = Vec::new();
    for worker in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..20 {
                let requirement = format!("worker {worker} requirement {i}");
                let content = format!("body {worker}-{i}");
                let doc = GeneratedDocument::new(DocumentType::Sow, content.clone());
                cache.cache_document(&requirement, &doc).await.unwrap();
                let read = cache
                    .get_cached_document(DocumentType::Sow, &requirement)
                    .await
                    .unwrap();
                assert_eq!(read.map(|d| d.content), Some(content));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Then: nothing was evicted or lost
    let stats = cache.get_cache_statistics().await;
    assert_eq!(stats.item_count, 160);
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.integrity_failures, 0);
    assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_during_rotation_never_fail_integrity() {
    // Given: an encrypted cache with 30 entries
    let mut config = CacheConfig::secure();
    config.max_items = 100;
    let cache = shared_cache(config);
    for i in 0..30 {
        let doc = GeneratedDocument::new(DocumentType::Pws, format!("content {i}"));
        cache.cache_document(&format!("req {i}"), &doc).await.unwrap();
    }

    // When: readers run while the key is rotated several times
    let rotator = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            for _ in 0..5 {
                let summary = cache.rotate_encryption_key().await.unwrap();
                assert_eq!(summary.purged, 0);
                tokio::task::yield_now().await;
            }
        })
    };
    let mut readers = Vec::new();
    for reader in 0..4 {
        let cache = Arc::clone(&cache);
        readers.push(tokio::spawn(async move {
            for round in 0..30 {
                let i = (reader * 7 + round) % 30;
                let read = cache
                    .get_cached_document(DocumentType::Pws, &format!("req {i}"))
                    .await
                    .unwrap();
                assert_eq!(read.map(|d| d.content), Some(format!("content {i}")));
            }
        }));
    }
    rotator.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    // Then: every entry is still readable under the final key
    let stats = cache.get_cache_statistics().await;
    assert_eq!(stats.item_count, 30);
    assert_eq!(stats.integrity_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_respect_item_limit() {
    // Given: a small non-adaptive cache
    let mut config = CacheConfig::standard();
    config.max_items = 10;
    let cache = shared_cache(config);

    // When: many tasks write at once
    let mut handles = Vec::new();
    for worker in 0..6 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                let doc = GeneratedDocument::new(DocumentType::Qasp, "x");
                cache.cache_document(&format!("{worker}/{i}"), &doc).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Then: the limit holds and every overflow was counted
    let stats = cache.get_cache_statistics().await;
    assert_eq!(stats.item_count, 10);
    assert_eq!(stats.evictions, 50);
}
