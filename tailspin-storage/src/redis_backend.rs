//! Redis cache backend.
//!
//! Enabled with the `redis` feature. Each call checks out a multiplexed
//! connection; Redis gives the per-key atomicity the token cache relies on.

use crate::backend::CacheBackend;
use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;
use std::time::Duration;
use tailspin_core::{CacheError, TailspinResult};

/// [`CacheBackend`] over a Redis server.
#[derive(Debug, Clone)]
pub struct RedisCacheBackend {
    client: Arc<RedisClient>,
}

impl RedisCacheBackend {
    pub fn new(client: Arc<RedisClient>) -> Self {
        Self { client }
    }

    /// Open a client for `redis://...` without connecting yet.
    pub fn open(url: &str) -> TailspinResult<Self> {
        let client = RedisClient::open(url).map_err(|e| CacheError::ReadFailed {
            key: String::new(),
            reason: format!("invalid redis url: {}", e),
        })?;
        Ok(Self::new(Arc::new(client)))
    }

    async fn connection(&self) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> TailspinResult<Option<Vec<u8>>> {
        let read_failed = |e: redis::RedisError| CacheError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let mut conn = self.connection().await.map_err(read_failed)?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(read_failed)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TailspinResult<()> {
        let write_failed = |e: redis::RedisError| CacheError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let mut conn = self.connection().await.map_err(write_failed)?;

        match ttl.map(|ttl| ttl.as_secs()) {
            Some(secs) if secs > 0 => {
                let _: () = conn.set_ex(key, value, secs).await.map_err(write_failed)?;
            }
            _ => {
                let _: () = conn.set(key, value).await.map_err(write_failed)?;
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> TailspinResult<()> {
        let remove_failed = |e: redis::RedisError| CacheError::RemoveFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let mut conn = self.connection().await.map_err(remove_failed)?;
        let _: () = conn.del(key).await.map_err(remove_failed)?;
        Ok(())
    }
}
