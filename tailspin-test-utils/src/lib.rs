//! Tailspin Test Utilities
//!
//! Shared test infrastructure for the Tailspin workspace:
//! - Mock identity provider with scripted responses and call counters
//! - Failing and counting cache backends, failing tenant store
//! - Proptest generators for token cache types
//! - Test fixtures and assertions

pub use tailspin_core::{
    AccessToken, AzureAdConfig, CacheError, CachedToken, ClientCredential, IdentityProvider,
    RegisteredTenant, StoreError, TailspinError, TailspinResult, TenantId, Timestamp,
    TokenCacheEntry, TokenError, TokenKey, TokenRequest, TokenResponse, TrustError, UserId,
};
pub use tailspin_storage::{CacheBackend, TenantStore};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tailspin_core::Grant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK IDENTITY PROVIDER
// ============================================================================

/// A token request as seen by [`MockIdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub tenant_id: TenantId,
    pub resource: String,
    pub client_id: String,
    pub grant_type: &'static str,
    pub refresh_token: Option<String>,
    pub code: Option<String>,
}

/// Identity provider that replays scripted responses in order.
///
/// An exhausted script answers with an `IdentityProvider` error.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    script: Mutex<VecDeque<TailspinResult<TokenResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering. Used to drive request timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, response: TokenResponse) {
        lock(&self.script).push_back(Ok(response));
    }

    pub fn push_err(&self, error: TailspinError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Number of token requests received, including ones that timed out.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn acquire_token(&self, request: TokenRequest) -> TailspinResult<TokenResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (refresh_token, code) = match &request.grant {
            Grant::RefreshToken { refresh_token } => (Some(refresh_token.clone()), None),
            Grant::AuthorizationCode { code, .. } => (None, Some(code.clone())),
        };
        lock(&self.requests).push(RecordedRequest {
            tenant_id: request.tenant_id.clone(),
            resource: request.resource.clone(),
            client_id: request.credential.client_id().to_string(),
            grant_type: request.grant.grant_type(),
            refresh_token,
            code,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| {
            Err(TokenError::IdentityProvider {
                status: None,
                code: "unscripted".to_string(),
                description: "mock identity provider has no scripted response".to_string(),
            }
            .into())
        })
    }
}

// ============================================================================
// MOCK CACHE BACKENDS
// ============================================================================

/// Cache backend whose every operation fails.
#[derive(Debug, Clone, Default)]
pub struct FailingCacheBackend;

impl FailingCacheBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, key: &str) -> TailspinResult<Option<Vec<u8>>> {
        Err(CacheError::ReadFailed {
            key: key.to_string(),
            reason: "backend unavailable".to_string(),
        }
        .into())
    }

    async fn set(&self, key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> TailspinResult<()> {
        Err(CacheError::WriteFailed {
            key: key.to_string(),
            reason: "backend unavailable".to_string(),
        }
        .into())
    }

    async fn remove(&self, key: &str) -> TailspinResult<()> {
        Err(CacheError::RemoveFailed {
            key: key.to_string(),
            reason: "backend unavailable".to_string(),
        }
        .into())
    }
}

/// Wraps a backend and counts calls.
#[derive(Debug, Default)]
pub struct CountingCacheBackend<B> {
    inner: B,
    gets: AtomicUsize,
    sets: AtomicUsize,
    removes: AtomicUsize,
    last_ttl: Mutex<Option<Duration>>,
}

impl<B: CacheBackend> CountingCacheBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            last_ttl: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// TTL passed to the most recent `set`.
    pub fn last_ttl(&self) -> Option<Duration> {
        *lock(&self.last_ttl)
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for CountingCacheBackend<B> {
    async fn get(&self, key: &str) -> TailspinResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TailspinResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_ttl) = ttl;
        self.inner.set(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> TailspinResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }
}

// ============================================================================
// MOCK TENANT STORE
// ============================================================================

/// Tenant store that is always unavailable.
#[derive(Debug, Clone, Default)]
pub struct FailingTenantStore;

impl FailingTenantStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TenantStore for FailingTenantStore {
    async fn find_by_tenant_id(
        &self,
        _tenant_id: &TenantId,
    ) -> TailspinResult<Option<RegisteredTenant>> {
        Err(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into())
    }

    async fn upsert(&self, _tenant: RegisteredTenant) -> TailspinResult<RegisteredTenant> {
        Err(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for token cache types.

    use super::*;
    use proptest::prelude::*;

    /// Arbitrary printable text, including non-ASCII.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "\\PC{0,48}"
    }

    /// Timestamps between 2000 and 2100 at millisecond precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (946_684_800_000i64..4_102_444_800_000i64).prop_map(|millis| {
            chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
        })
    }

    pub fn arb_token_key() -> impl Strategy<Value = TokenKey> {
        (arb_text(), arb_text(), arb_text())
            .prop_map(|(client, resource, user)| TokenKey::new(client, resource, user))
    }

    pub fn arb_cached_token(resource: String) -> impl Strategy<Value = CachedToken> {
        (arb_text(), proptest::option::of(arb_text()), arb_timestamp()).prop_map(
            move |(access, refresh, expires_on)| {
                CachedToken::new(access, refresh, expires_on, resource.clone())
            },
        )
    }

    /// An entry of up to `max_tokens` tokens. A token's own resource is drawn
    /// independently of the resource in its key.
    pub fn arb_token_cache_entry(max_tokens: usize) -> impl Strategy<Value = TokenCacheEntry> {
        prop::collection::vec(
            (arb_token_key(), arb_text().prop_flat_map(arb_cached_token)),
            0..=max_tokens,
        )
        .prop_map(|pairs| pairs.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use secrecy::SecretString;

    pub const CLIENT_ID: &str = "surveys-web";

    /// 2024-01-01 00:00:00 UTC.
    pub fn epoch() -> Timestamp {
        chrono::DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default()
    }

    pub fn azure_ad_config() -> AzureAdConfig {
        AzureAdConfig {
            client_id: CLIENT_ID.to_string(),
            client_secret: SecretString::new("secret".into()),
            web_api_resource_id: "https://surveys/api".to_string(),
            ..AzureAdConfig::default()
        }
    }

    pub fn client_credential() -> ClientCredential {
        ClientCredential::secret(CLIENT_ID, "secret")
    }

    pub fn cached_token(
        access_token: &str,
        refresh_token: Option<&str>,
        expires_on: Timestamp,
        resource: &str,
    ) -> CachedToken {
        CachedToken::new(
            access_token,
            refresh_token.map(str::to_string),
            expires_on,
            resource,
        )
    }

    pub fn token_response(
        access_token: &str,
        refresh_token: Option<&str>,
        expires_on: Timestamp,
    ) -> TokenResponse {
        TokenResponse {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_on,
        }
    }

    /// Error as returned by the token endpoint.
    pub fn provider_error(status: u16, code: &str) -> TailspinError {
        TokenError::IdentityProvider {
            status: Some(status),
            code: code.to_string(),
            description: format!("{} returned by test", code),
        }
        .into()
    }

    pub fn registered_tenant(tenant_id: &str, issuer: &str) -> RegisteredTenant {
        RegisteredTenant::new(tenant_id, issuer, epoch())
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tailspin error variants.

    use super::*;

    /// Assert that the caller must re-run interactive sign-in.
    #[track_caller]
    pub fn assert_acquisition_required<T: std::fmt::Debug>(result: &TailspinResult<T>) {
        match result {
            Err(TailspinError::Token(TokenError::AcquisitionRequired { .. })) => {}
            other => panic!("Expected AcquisitionRequired, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_untrusted_issuer<T: std::fmt::Debug>(result: &TailspinResult<T>, tenant: &str) {
        match result {
            Err(TailspinError::Trust(TrustError::UntrustedIssuer { tenant_id, .. })) => {
                assert_eq!(tenant_id, tenant, "Wrong tenant in UntrustedIssuer error");
            }
            other => panic!("Expected UntrustedIssuer for {}, got: {:?}", tenant, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_mock_provider_replays_script() {
        let provider = MockIdentityProvider::new();
        provider.push_ok(fixtures::token_response("at", None, fixtures::epoch()));

        let request = TokenRequest {
            tenant_id: TenantId::from("t1"),
            resource: "r".to_string(),
            credential: fixtures::client_credential(),
            grant: Grant::RefreshToken {
                refresh_token: "rt".to_string(),
            },
        };
        let first = provider.acquire_token(request.clone()).await;
        assert_eq!(first.unwrap().access_token, "at");

        // Script exhausted
        assert!(provider.acquire_token(request).await.is_err());
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.requests()[0].refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = FailingCacheBackend::new();
        assert!(backend.get("k").await.is_err());
        assert!(backend.set("k", vec![], None).await.is_err());
        assert!(backend.remove("k").await.is_err());
    }

    #[test]
    fn test_assertions() {
        let result: TailspinResult<()> = Err(TailspinError::acquisition_required("x"));
        assertions::assert_acquisition_required(&result);

        let result: TailspinResult<()> = Err(TailspinError::untrusted_issuer("i", "t2"));
        assertions::assert_untrusted_issuer(&result, "t2");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_entries_respect_size(entry in generators::arb_token_cache_entry(4)) {
            prop_assert!(entry.len() <= 4);
        }

        #[test]
        fn prop_generated_tokens_keep_resource(entry in generators::arb_token_cache_entry(4)) {
            for (key, token) in entry.iter() {
                prop_assert_eq!(&key.resource, token.resource());
            }
        }
    }
}
