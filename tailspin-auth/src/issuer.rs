//! Multi-tenant issuer validation.
//!
//! A token is trusted only when its tenant has signed up and the token's
//! issuer matches the issuer recorded at sign-up. Registered tenants are read
//! through a small in-process cache in front of the [`TenantStore`].

use dashmap::DashMap;
use std::sync::Arc;
use tailspin_core::{
    IssuerPolicyConfig, RegisteredTenant, TailspinError, TailspinResult, TenantId, TrustError,
};
use tailspin_storage::TenantStore;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedTenant {
    tenant: RegisteredTenant,
    cached_at: Instant,
}

/// Validates token issuers against registered tenants.
pub struct IssuerValidationPolicy {
    store: Arc<dyn TenantStore>,
    cache: DashMap<TenantId, CachedTenant>,
    config: IssuerPolicyConfig,
}

impl IssuerValidationPolicy {
    pub fn new(store: Arc<dyn TenantStore>, config: IssuerPolicyConfig) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            config,
        }
    }

    /// Accept `issuer` for `tenant_id` or fail with `UntrustedIssuer`.
    ///
    /// Tenant store failures propagate; the request is rejected rather than
    /// trusted.
    pub async fn validate(
        &self,
        issuer: &str,
        tenant_id: &TenantId,
    ) -> TailspinResult<RegisteredTenant> {
        if tenant_id.as_str().is_empty() {
            return Err(TrustError::MissingClaim {
                claim: "tid".to_string(),
            }
            .into());
        }

        let Some(tenant) = self.find_tenant(tenant_id).await? else {
            tracing::warn!(
                tenant_id = %tenant_id,
                issuer = %issuer,
                "Rejected token from unregistered tenant"
            );
            return Err(TailspinError::untrusted_issuer(issuer, tenant_id.as_str()));
        };

        if !tenant.matches_issuer(issuer) {
            tracing::warn!(
                tenant_id = %tenant_id,
                issuer = %issuer,
                expected = %tenant.issuer_value,
                "Rejected token with mismatched issuer"
            );
            return Err(TailspinError::untrusted_issuer(issuer, tenant_id.as_str()));
        }

        Ok(tenant)
    }

    /// Register a tenant on first sign-in and make it visible to
    /// [`validate`](Self::validate) immediately.
    pub async fn register(&self, tenant: RegisteredTenant) -> TailspinResult<RegisteredTenant> {
        let stored = self.store.upsert(tenant).await?;
        self.prime(stored.clone());
        Ok(stored)
    }

    /// Seed the local cache with a tenant known to be registered.
    pub fn prime(&self, tenant: RegisteredTenant) {
        self.insert(tenant, Instant::now());
    }

    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.remove(tenant_id);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Read-through lookup of a registered tenant. Absence is not cached.
    pub async fn find_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> TailspinResult<Option<RegisteredTenant>> {
        let now = Instant::now();
        let cached = self.cache.get(tenant_id).map(|c| c.value().clone());
        if let Some(cached) = cached {
            if now.duration_since(cached.cached_at) < self.config.cache_ttl {
                return Ok(Some(cached.tenant));
            }
            self.cache
                .remove_if(tenant_id, |_, c| c.cached_at == cached.cached_at);
        }

        let found = self.store.find_by_tenant_id(tenant_id).await.map_err(|e| {
            tracing::error!(
                tenant_id = %tenant_id,
                error = %e,
                "Tenant store lookup failed"
            );
            e
        })?;

        if let Some(tenant) = &found {
            self.insert(tenant.clone(), now);
        }
        Ok(found)
    }

    fn insert(&self, tenant: RegisteredTenant, now: Instant) {
        if self.config.cache_capacity == 0 {
            return;
        }
        if !self.cache.contains_key(&tenant.tenant_id)
            && self.cache.len() >= self.config.cache_capacity
        {
            self.evict(now);
        }
        self.cache.insert(
            tenant.tenant_id.clone(),
            CachedTenant {
                tenant,
                cached_at: now,
            },
        );
    }

    /// Drop expired entries, then the oldest one if still at capacity.
    fn evict(&self, now: Instant) {
        let ttl = self.config.cache_ttl;
        self.cache
            .retain(|_, c| now.duration_since(c.cached_at) < ttl);

        if self.cache.len() >= self.config.cache_capacity {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|c| c.value().cached_at)
                .map(|c| c.key().clone());
            if let Some(key) = oldest {
                self.cache.remove(&key);
            }
        }
    }
}

impl std::fmt::Debug for IssuerValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerValidationPolicy")
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tailspin_core::{Clock, StoreError, SystemClock};
    use tailspin_storage::InMemoryTenantStore;
    use tailspin_test_utils::FailingTenantStore;

    fn registered(tenant: &str, issuer: &str) -> RegisteredTenant {
        RegisteredTenant::new(tenant, issuer, SystemClock.now())
    }

    fn policy(store: Arc<dyn TenantStore>) -> IssuerValidationPolicy {
        IssuerValidationPolicy::new(store, IssuerPolicyConfig::default())
    }

    #[tokio::test]
    async fn test_unregistered_tenant_rejected_until_registered() {
        let policy = policy(Arc::new(InMemoryTenantStore::new()));
        let t1 = TenantId::from("t1");

        let err = policy.validate("https://login/t1", &t1).await.unwrap_err();
        assert!(err.is_trust_failure());
        // Absence is not cached
        assert_eq!(policy.cached_len(), 0);

        policy
            .register(registered("t1", "https://login/t1"))
            .await
            .unwrap();
        assert!(policy.validate("https://login/t1", &t1).await.is_ok());
    }

    #[tokio::test]
    async fn test_registered_elsewhere_is_picked_up() {
        let store = Arc::new(InMemoryTenantStore::new());
        let policy = policy(store.clone());
        let t1 = TenantId::from("t1");

        assert!(policy.validate("https://login/t1", &t1).await.is_err());

        // Another instance registers the tenant
        store.upsert(registered("t1", "https://login/t1")).await.unwrap();
        assert!(policy.validate("https://login/t1", &t1).await.is_ok());
    }

    #[tokio::test]
    async fn test_issuer_mismatch_rejected() {
        let store = InMemoryTenantStore::with_tenants(vec![registered("t1", "https://login/t1")]);
        let policy = policy(Arc::new(store));

        let err = policy
            .validate("https://login/t2", &TenantId::from("t1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TailspinError::untrusted_issuer("https://login/t2", "t1")
        );
    }

    #[tokio::test]
    async fn test_issuer_differing_only_in_case_rejected() {
        let store = InMemoryTenantStore::with_tenants(vec![registered("t1", "https://login/t1")]);
        let policy = policy(Arc::new(store));

        let err = policy
            .validate("HTTPS://LOGIN/T1", &TenantId::from("t1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TailspinError::untrusted_issuer("HTTPS://LOGIN/T1", "t1")
        );
        assert!(policy
            .validate("https://login/t1/", &TenantId::from("t1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_template_issuer() {
        let store = InMemoryTenantStore::with_tenants(vec![registered(
            "t1",
            "https://sts.windows.net/{tenantid}/",
        )]);
        let policy = policy(Arc::new(store));
        let t1 = TenantId::from("t1");

        assert!(policy.validate("https://sts.windows.net/t1/", &t1).await.is_ok());
        assert!(policy.validate("https://sts.windows.net/t1", &t1).await.is_ok());
        assert!(policy.validate("https://sts.windows.net/t2/", &t1).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_tenant_claim() {
        let policy = policy(Arc::new(InMemoryTenantStore::new()));
        let err = policy
            .validate("https://login/t1", &TenantId::from(""))
            .await
            .unwrap_err();
        assert!(matches!(err, TailspinError::Trust(TrustError::MissingClaim { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let policy = policy(Arc::new(FailingTenantStore::new()));
        let err = policy
            .validate("https://login/t1", &TenantId::from("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TailspinError::Store(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_primed_tenant_served_without_store() {
        let policy = policy(Arc::new(FailingTenantStore::new()));
        policy.prime(registered("t1", "https://login/t1"));
        assert!(policy
            .validate("https://login/t1", &TenantId::from("t1"))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let policy = IssuerValidationPolicy::new(
            Arc::new(FailingTenantStore::new()),
            IssuerPolicyConfig {
                cache_ttl: Duration::from_secs(60),
                cache_capacity: 16,
            },
        );
        let t1 = TenantId::from("t1");
        policy.prime(registered("t1", "https://login/t1"));

        tokio::time::advance(Duration::from_secs(61)).await;

        // Cache expired, the failing store is consulted
        assert!(policy.validate("https://login/t1", &t1).await.is_err());
        assert_eq!(policy.cached_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let policy = IssuerValidationPolicy::new(
            Arc::new(InMemoryTenantStore::new()),
            IssuerPolicyConfig {
                cache_ttl: Duration::from_secs(300),
                cache_capacity: 2,
            },
        );

        policy.prime(registered("t1", "https://login/t1"));
        tokio::time::advance(Duration::from_secs(1)).await;
        policy.prime(registered("t2", "https://login/t2"));
        tokio::time::advance(Duration::from_secs(1)).await;
        policy.prime(registered("t3", "https://login/t3"));

        assert_eq!(policy.cached_len(), 2);
        assert!(!policy.cache.contains_key(&TenantId::from("t1")));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let policy = policy(Arc::new(InMemoryTenantStore::new()));
        policy.prime(registered("t1", "https://login/t1"));
        policy.invalidate(&TenantId::from("t1"));
        assert!(policy
            .validate("https://login/t1", &TenantId::from("t1"))
            .await
            .is_err());
    }
}
