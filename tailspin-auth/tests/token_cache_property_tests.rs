//! Property-Based Tests for the Token Serializer and Distributed Token Cache
//!
//! - Decoding an encoded entry yields the same entry.
//! - Arbitrary bytes either decode to a well-formed entry or are rejected as
//!   corrupt; decoding never panics.
//! - Save then load returns the saved entry; clear then load is empty.
//! - Concurrent saves to one key leave exactly one of the written entries.

use proptest::prelude::*;
use std::sync::Arc;
use tailspin_auth::serializer::{deserialize, serialize};
use tailspin_auth::DistributedTokenCache;
use tailspin_core::{CacheError, TokenCacheConfig, TokenCacheEntry, TokenCacheKey};
use tailspin_storage::InMemoryCacheBackend;
use tailspin_test_utils::generators::arb_token_cache_entry;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn test_cache() -> DistributedTokenCache {
    DistributedTokenCache::new(
        Arc::new(InMemoryCacheBackend::new()),
        TokenCacheConfig::default(),
    )
}

fn cache_key_strategy() -> impl Strategy<Value = TokenCacheKey> {
    ("[a-z0-9-]{1,16}", "[a-z0-9-]{1,16}")
        .prop_map(|(user, tenant)| TokenCacheKey::new(user, tenant))
}

// ============================================================================
// SERIALIZER PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_serializer_roundtrip(entry in arb_token_cache_entry(8)) {
        let bytes = serialize(&entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = deserialize(&bytes).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, entry);
    }

    #[test]
    fn prop_token_resource_independent_of_key(entry in arb_token_cache_entry(8)) {
        let bytes = serialize(&entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = deserialize(&bytes).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for (key, token) in entry.iter() {
            prop_assert_eq!(decoded.get(key).map(|t| t.resource()), Some(token.resource()));
        }
    }

    #[test]
    fn prop_arbitrary_bytes_never_partially_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        match deserialize(&bytes) {
            Ok(entry) => {
                let bytes = serialize(&entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(deserialize(&bytes), Ok(entry));
            }
            Err(e) => {
                let is_corrupt = matches!(e, CacheError::CorruptData { .. });
                prop_assert!(is_corrupt);
            }
        }
    }

    #[test]
    fn prop_truncated_encoding_is_corrupt(entry in arb_token_cache_entry(4), cut in 1usize..64) {
        let bytes = serialize(&entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let len = bytes.len().saturating_sub(cut);
        prop_assert!(deserialize(&bytes[..len]).is_err());
    }
}

// ============================================================================
// TOKEN CACHE PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_load_unwritten_key_is_empty(key in cache_key_strategy()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = test_cache();
            prop_assert!(cache.load(&key).await.is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn prop_save_then_load(key in cache_key_strategy(), entry in arb_token_cache_entry(6)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = test_cache();
            cache.save(&key, &entry).await;
            prop_assert_eq!(cache.load(&key).await, entry);
            Ok(())
        })?;
    }

    #[test]
    fn prop_clear_then_load_is_empty(key in cache_key_strategy(), entry in arb_token_cache_entry(6)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = test_cache();
            cache.save(&key, &entry).await;
            cache.clear(&key).await;
            prop_assert!(cache.load(&key).await.is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn prop_concurrent_saves_last_write_wins(
        key in cache_key_strategy(),
        entries in prop::collection::vec(arb_token_cache_entry(3), 2..6),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = Arc::new(test_cache());

            let handles: Vec<_> = entries
                .iter()
                .cloned()
                .map(|entry| {
                    let cache = cache.clone();
                    let key = key.clone();
                    tokio::spawn(async move { cache.save(&key, &entry).await })
                })
                .collect();
            for handle in handles {
                handle.await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            }

            let loaded = cache.load(&key).await;
            // Empty entries are written as removals
            let candidates: Vec<&TokenCacheEntry> = entries.iter().collect();
            prop_assert!(
                candidates.contains(&&loaded),
                "final entry is not one of the written entries"
            );
            prop_assert_eq!(cache.stats().corrupt_entries, 0);
            Ok(())
        })?;
    }
}
