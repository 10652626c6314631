//! Tenant registry.
//!
//! The persistent tenant table is owned by the application's SQL store; the
//! authentication core only needs lookup by tenant id and idempotent
//! registration.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tailspin_core::{RegisteredTenant, TailspinResult, TenantId};
use tokio::sync::RwLock;

/// Lookup and registration of trusted tenants.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find a registered tenant.
    async fn find_by_tenant_id(&self, tenant_id: &TenantId)
        -> TailspinResult<Option<RegisteredTenant>>;

    /// Register a tenant unless it already exists.
    ///
    /// Registered tenants are never mutated: when the tenant is already
    /// present the stored record is returned unchanged.
    async fn upsert(&self, tenant: RegisteredTenant) -> TailspinResult<RegisteredTenant>;
}

/// In-memory [`TenantStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantStore {
    tenants: Arc<RwLock<HashMap<TenantId, RegisteredTenant>>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with already-registered tenants.
    pub fn with_tenants(tenants: impl IntoIterator<Item = RegisteredTenant>) -> Self {
        let map = tenants
            .into_iter()
            .map(|t| (t.tenant_id.clone(), t))
            .collect();
        Self {
            tenants: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn len(&self) -> usize {
        self.tenants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tenants.read().await.is_empty()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_by_tenant_id(
        &self,
        tenant_id: &TenantId,
    ) -> TailspinResult<Option<RegisteredTenant>> {
        Ok(self.tenants.read().await.get(tenant_id).cloned())
    }

    async fn upsert(&self, tenant: RegisteredTenant) -> TailspinResult<RegisteredTenant> {
        let mut tenants = self.tenants.write().await;
        let stored = tenants
            .entry(tenant.tenant_id.clone())
            .or_insert(tenant)
            .clone();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_find_missing_tenant() {
        let store = InMemoryTenantStore::new();
        let found = store.find_by_tenant_id(&TenantId::from("t1")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_upsert_registers_once() {
        let store = InMemoryTenantStore::new();
        let first = RegisteredTenant::new("t1", "https://login/t1", Utc::now());

        let stored = store.upsert(first.clone()).await.unwrap();
        assert_eq!(stored, first);

        // A second registration does not overwrite the original record
        let second = RegisteredTenant::new(
            "t1",
            "https://login/other",
            Utc::now() + Duration::hours(1),
        );
        let stored = store.upsert(second).await.unwrap();
        assert_eq!(stored, first);
        assert_eq!(store.len().await, 1);

        let found = store.find_by_tenant_id(&TenantId::from("t1")).await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn test_seeded_store() {
        let store = InMemoryTenantStore::with_tenants(vec![RegisteredTenant::new(
            "t1",
            "https://login/t1",
            Utc::now(),
        )]);
        assert!(!store.is_empty().await);
    }
}
