//! Distributed token cache.
//!
//! Each user's [`TokenCacheEntry`] is serialized and stored under a single
//! backend key. The cache never fails its callers: backend failures and
//! corrupt data degrade to a cache miss, and failed writes are dropped after
//! being logged and counted.

use crate::serializer;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tailspin_core::{TokenCacheConfig, TokenCacheEntry, TokenCacheKey};
use tailspin_storage::CacheBackend;

// ============================================================================
// STATS
// ============================================================================

/// Point-in-time counters for the token cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub corrupt_entries: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    corrupt_entries: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TokenCacheStats {
        TokenCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Per-user token cache over a [`CacheBackend`].
///
/// Concurrent writers to the same key are last-write-wins.
pub struct DistributedTokenCache {
    backend: Arc<dyn CacheBackend>,
    config: TokenCacheConfig,
    stats: StatsCounters,
}

impl DistributedTokenCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: TokenCacheConfig) -> Self {
        Self {
            backend,
            config,
            stats: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &TokenCacheConfig {
        &self.config
    }

    /// Load a user's entry. Returns an empty entry on miss or any failure.
    pub async fn load(&self, key: &TokenCacheKey) -> TokenCacheEntry {
        let cache_key = key.storage_key(&self.config.key_prefix);

        let bytes = match self.backend.get(&cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                StatsCounters::bump(&self.stats.misses);
                tracing::trace!(cache_key = %cache_key, "Token cache miss");
                return TokenCacheEntry::new();
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.read_failures);
                tracing::warn!(
                    cache_key = %cache_key,
                    tenant_id = %key.tenant_id(),
                    user_id = %key.user_id(),
                    error = %e,
                    "Reading from token cache failed"
                );
                return TokenCacheEntry::new();
            }
        };

        match serializer::deserialize(&bytes) {
            Ok(entry) => {
                StatsCounters::bump(&self.stats.hits);
                tracing::trace!(
                    cache_key = %cache_key,
                    token_count = entry.len(),
                    "Retrieved tokens from cache"
                );
                entry
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.corrupt_entries);
                tracing::warn!(
                    cache_key = %cache_key,
                    bytes = bytes.len(),
                    error = %e,
                    "Discarding corrupt token cache entry"
                );
                if let Err(e) = self.backend.remove(&cache_key).await {
                    tracing::warn!(
                        cache_key = %cache_key,
                        error = %e,
                        "Removing corrupt token cache entry failed"
                    );
                }
                TokenCacheEntry::new()
            }
        }
    }

    /// Persist a user's entry. An empty entry removes the key.
    pub async fn save(&self, key: &TokenCacheKey, entry: &TokenCacheEntry) {
        let cache_key = key.storage_key(&self.config.key_prefix);

        if entry.is_empty() {
            if let Err(e) = self.backend.remove(&cache_key).await {
                StatsCounters::bump(&self.stats.write_failures);
                tracing::warn!(
                    cache_key = %cache_key,
                    error = %e,
                    "Removing empty token cache entry failed"
                );
            }
            return;
        }

        let bytes = match serializer::serialize(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                StatsCounters::bump(&self.stats.write_failures);
                tracing::warn!(
                    cache_key = %cache_key,
                    error = %e,
                    "Encoding token cache entry failed"
                );
                return;
            }
        };
        let size = bytes.len();
        match self
            .backend
            .set(&cache_key, bytes, self.config.entry_ttl)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    cache_key = %cache_key,
                    token_count = entry.len(),
                    bytes = size,
                    "Wrote tokens to cache"
                );
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.write_failures);
                tracing::warn!(
                    cache_key = %cache_key,
                    tenant_id = %key.tenant_id(),
                    user_id = %key.user_id(),
                    error = %e,
                    "Writing to token cache failed"
                );
            }
        }
    }

    /// Remove a user's entry. Clearing a missing key is a no-op.
    pub async fn clear(&self, key: &TokenCacheKey) {
        let cache_key = key.storage_key(&self.config.key_prefix);
        match self.backend.remove(&cache_key).await {
            Ok(()) => {
                tracing::info!(
                    cache_key = %cache_key,
                    tenant_id = %key.tenant_id(),
                    user_id = %key.user_id(),
                    "Cleared token cache"
                );
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.write_failures);
                tracing::warn!(
                    cache_key = %cache_key,
                    error = %e,
                    "Clearing token cache failed"
                );
            }
        }
    }

    pub fn stats(&self) -> TokenCacheStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for DistributedTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedTokenCache")
            .field("key_prefix", &self.config.key_prefix)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tailspin_core::{CachedToken, TokenKey};
    use tailspin_storage::InMemoryCacheBackend;
    use tailspin_test_utils::{CountingCacheBackend, FailingCacheBackend};

    fn key() -> TokenCacheKey {
        TokenCacheKey::new("u1", "t1")
    }

    fn entry_with_token() -> TokenCacheEntry {
        let mut entry = TokenCacheEntry::new();
        entry.insert(
            TokenKey::new("client", "https://surveys/api", "u1"),
            CachedToken::new(
                "at",
                Some("rt".into()),
                Utc::now() + Duration::hours(1),
                "https://surveys/api",
            ),
        );
        entry
    }

    fn cache_over(backend: Arc<dyn CacheBackend>) -> DistributedTokenCache {
        DistributedTokenCache::new(backend, TokenCacheConfig::default())
    }

    #[tokio::test]
    async fn test_load_missing_key_is_empty() {
        let cache = cache_over(Arc::new(InMemoryCacheBackend::new()));
        assert!(cache.load(&key()).await.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let cache = cache_over(Arc::new(InMemoryCacheBackend::new()));
        let entry = entry_with_token();

        cache.save(&key(), &entry).await;
        assert_eq!(cache.load(&key()).await, entry);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_clear_then_load_is_empty() {
        let cache = cache_over(Arc::new(InMemoryCacheBackend::new()));
        cache.save(&key(), &entry_with_token()).await;

        cache.clear(&key()).await;
        assert!(cache.load(&key()).await.is_empty());

        // Idempotent
        cache.clear(&key()).await;
    }

    #[tokio::test]
    async fn test_entries_are_isolated_per_tenant() {
        let cache = cache_over(Arc::new(InMemoryCacheBackend::new()));
        cache.save(&TokenCacheKey::new("u1", "t1"), &entry_with_token()).await;
        assert!(cache.load(&TokenCacheKey::new("u1", "t2")).await.is_empty());
    }

    #[tokio::test]
    async fn test_saving_empty_entry_removes_key() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = cache_over(backend.clone());

        cache.save(&key(), &entry_with_token()).await;
        assert_eq!(backend.len().await, 1);

        cache.save(&key(), &TokenCacheEntry::new()).await;
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_miss() {
        let cache = cache_over(Arc::new(FailingCacheBackend::new()));
        assert!(cache.load(&key()).await.is_empty());
        assert_eq!(cache.stats().read_failures, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let cache = cache_over(Arc::new(FailingCacheBackend::new()));
        cache.save(&key(), &entry_with_token()).await;
        cache.clear(&key()).await;
        assert_eq!(cache.stats().write_failures, 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_removed() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = cache_over(backend.clone());
        let storage_key = key().storage_key(&cache.config().key_prefix);

        backend
            .set(&storage_key, b"not a token cache".to_vec(), None)
            .await
            .unwrap();

        assert!(cache.load(&key()).await.is_empty());
        assert!(backend.get(&storage_key).await.unwrap().is_none());
        assert_eq!(cache.stats().corrupt_entries, 1);
    }

    #[tokio::test]
    async fn test_save_passes_configured_ttl() {
        let backend = Arc::new(CountingCacheBackend::new(InMemoryCacheBackend::new()));
        let config = TokenCacheConfig::default()
            .with_ttl(Some(std::time::Duration::from_secs(600)));
        let cache = DistributedTokenCache::new(backend.clone(), config);

        cache.save(&key(), &entry_with_token()).await;
        assert_eq!(backend.sets(), 1);
        assert_eq!(
            backend.last_ttl(),
            Some(std::time::Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let config = TokenCacheConfig::default().with_prefix("surveys");
        let cache = DistributedTokenCache::new(backend.clone(), config);

        cache.save(&key(), &entry_with_token()).await;
        assert!(backend.get("surveys:t1:u1").await.unwrap().is_some());
    }
}
