//! Distributed cache backend trait.
//!
//! The token cache treats the backend as an opaque byte store addressed by
//! string keys. Backends give per-key atomicity and nothing more: no
//! cross-key transactions, no TTL guarantee.

use async_trait::async_trait;
use std::time::Duration;
use tailspin_core::TailspinResult;

/// Key-value store backing the distributed token cache.
///
/// Implementations must be safe to share across concurrent requests. Errors
/// are reported as `CacheError` variants; the caller decides how to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the bytes stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> TailspinResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any existing value.
    ///
    /// `ttl` is a hint; backends without expiry support may ignore it.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TailspinResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> TailspinResult<()>;
}
