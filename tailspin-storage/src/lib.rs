//! Tailspin Storage - cache backends and tenant store
//!
//! The authentication core consumes two external collaborators through the
//! traits defined here:
//!
//! - [`CacheBackend`]: byte-oriented distributed cache holding serialized
//!   token cache entries. [`InMemoryCacheBackend`] is always available;
//!   `RedisCacheBackend` is enabled by the `redis` feature.
//! - [`TenantStore`]: registry of trusted tenants.

pub mod backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod tenant_store;

pub use backend::CacheBackend;
pub use memory::InMemoryCacheBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacheBackend;
pub use tenant_store::{InMemoryTenantStore, TenantStore};
