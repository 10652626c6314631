//! Shared application state for Axum routers.

use std::sync::Arc;

use tailspin_auth::{
    AuthenticationEvents, BearerConfig, BearerValidator, DistributedTokenCache,
    HttpIdentityProvider, IssuerValidationPolicy, TokenAcquisitionService,
};
use tailspin_core::{AzureAdConfig, Clock, IdentityProvider, SystemClock, TailspinConfig};
use tailspin_storage::{CacheBackend, InMemoryCacheBackend, InMemoryTenantStore, TenantStore};

use crate::config::{ApiConfig, CacheBackendKind};
use crate::error::ApiResult;

/// External collaborators the authentication services are built over.
pub struct Adapters {
    pub cache_backend: Arc<dyn CacheBackend>,
    pub tenant_store: Arc<dyn TenantStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub bearer: Arc<BearerValidator>,
    pub events: Arc<AuthenticationEvents>,
    pub acquisition: Arc<TokenAcquisitionService>,
    pub token_cache: Arc<DistributedTokenCache>,
    pub azure_ad: Arc<AzureAdConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the authentication services over the given adapters.
    pub fn from_adapters(
        adapters: Adapters,
        config: &TailspinConfig,
        bearer: &BearerConfig,
    ) -> ApiResult<Self> {
        let token_cache = Arc::new(DistributedTokenCache::new(
            adapters.cache_backend,
            config.token_cache.clone(),
        ));
        let acquisition = Arc::new(TokenAcquisitionService::new(
            token_cache.clone(),
            adapters.identity_provider,
            adapters.clock.clone(),
            &config.provider,
        ));
        let policy = Arc::new(IssuerValidationPolicy::new(
            adapters.tenant_store,
            config.issuer_policy.clone(),
        ));
        let events = Arc::new(AuthenticationEvents::new(
            policy.clone(),
            acquisition.clone(),
            config.azure_ad.clone(),
            adapters.clock.clone(),
        ));
        let bearer = Arc::new(BearerValidator::new(bearer, policy, adapters.clock)?);

        Ok(Self {
            bearer,
            events,
            acquisition,
            token_cache,
            azure_ad: Arc::new(config.azure_ad.clone()),
            start_time: std::time::Instant::now(),
        })
    }

    /// Production wiring: configured cache backend, HTTP identity provider and
    /// the system clock.
    pub fn build(config: &TailspinConfig, api_config: &ApiConfig) -> ApiResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let adapters = Adapters {
            cache_backend: cache_backend(&api_config.cache_backend)?,
            tenant_store: Arc::new(InMemoryTenantStore::new()),
            identity_provider: Arc::new(HttpIdentityProvider::new(
                config.azure_ad.clone(),
                clock.clone(),
            )),
            clock,
        };
        Self::from_adapters(adapters, config, &api_config.bearer_config()?)
    }
}

fn cache_backend(kind: &CacheBackendKind) -> ApiResult<Arc<dyn CacheBackend>> {
    match kind {
        CacheBackendKind::Memory => {
            tracing::warn!("Using in-memory token cache; tokens are not shared between instances");
            Ok(Arc::new(InMemoryCacheBackend::new()))
        }
        #[cfg(feature = "redis")]
        CacheBackendKind::Redis { url } => {
            tracing::info!("Using Redis token cache");
            Ok(Arc::new(tailspin_storage::RedisCacheBackend::open(url)?))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackendKind::Redis { .. } => Err(crate::error::ApiError::internal_error(
            "Redis cache backend selected but the 'redis' feature is not enabled",
        )),
    }
}

macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<AppState> for $type {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Arc<BearerValidator>, bearer);
impl_from_ref!(Arc<AuthenticationEvents>, events);
impl_from_ref!(Arc<TokenAcquisitionService>, acquisition);
impl_from_ref!(Arc<DistributedTokenCache>, token_cache);
impl_from_ref!(Arc<AzureAdConfig>, azure_ad);
