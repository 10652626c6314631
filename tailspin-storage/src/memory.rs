//! In-process cache backend.
//!
//! Used for single-instance deployments and tests. Expiry is applied lazily
//! on read, and `set` sweeps expired keys whenever the map has grown past a
//! threshold, so keys that are never read again do not accumulate.

use crate::backend::CacheBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tailspin_core::TailspinResult;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Map size that triggers the first sweep.
const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug)]
struct Entries {
    values: HashMap<String, StoredValue>,
    sweep_threshold: usize,
    next_sweep_at: usize,
}

impl Entries {
    fn new(sweep_threshold: usize) -> Self {
        Self {
            values: HashMap::new(),
            sweep_threshold,
            next_sweep_at: sweep_threshold,
        }
    }

    /// Drop expired values and move the next sweep to twice the live size,
    /// keeping sweeps amortized when most keys are live.
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.values.len();
        self.values.retain(|_, v| v.is_live(now));
        self.next_sweep_at = self.sweep_threshold.max(self.values.len() * 2);
        before - self.values.len()
    }
}

/// In-memory [`CacheBackend`] backed by a `HashMap`.
#[derive(Debug, Clone)]
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<Entries>>,
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::with_sweep_threshold(DEFAULT_SWEEP_THRESHOLD)
    }
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired keys on `set` once the map holds more than
    /// `threshold` keys.
    pub fn with_sweep_threshold(threshold: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::new(threshold.max(1)))),
        }
    }

    /// Number of stored keys, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.values.is_empty()
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        self.entries.write().await.sweep(Instant::now())
    }

    pub async fn clear(&self) {
        self.entries.write().await.values.clear();
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> TailspinResult<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.values.get(key) {
                None => return Ok(None),
                Some(value) if value.is_live(now) => return Ok(Some(value.bytes.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict unless a writer replaced it in the meantime.
        let mut entries = self.entries.write().await;
        if entries.values.get(key).is_some_and(|v| !v.is_live(now)) {
            entries.values.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TailspinResult<()> {
        let now = Instant::now();
        let stored = StoredValue {
            bytes: value,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.write().await;
        entries.values.insert(key.to_string(), stored);
        if entries.values.len() > entries.next_sweep_at {
            let swept = entries.sweep(now);
            tracing::trace!(swept, remaining = entries.values.len(), "Swept expired cache keys");
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> TailspinResult<()> {
        self.entries.write().await.values.remove(key);
        Ok(())
    }
}
