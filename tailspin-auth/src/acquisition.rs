//! Token acquisition.
//!
//! Serves access tokens from the distributed token cache and silently renews
//! them with a refresh token when they are about to expire. Anything that
//! cannot be resolved silently is reported as
//! [`TokenError::AcquisitionRequired`] so the caller can send the user back
//! through interactive sign-in.

use crate::token_cache::DistributedTokenCache;
use std::sync::Arc;
use std::time::Duration;
use tailspin_core::{
    AccessToken, CachedToken, ClientCredential, Clock, Grant, IdentityProvider, ProviderConfig,
    TailspinError, TailspinResult, TenantId, TokenCacheEntry, TokenCacheKey, TokenError,
    TokenKey, TokenRequest, TokenResponse, UserId,
};

/// Obtains access tokens for downstream resources on behalf of a user.
pub struct TokenAcquisitionService {
    cache: Arc<DistributedTokenCache>,
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl TokenAcquisitionService {
    pub fn new(
        cache: Arc<DistributedTokenCache>,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        provider_config: &ProviderConfig,
    ) -> Self {
        Self {
            cache,
            provider,
            clock,
            request_timeout: provider_config.request_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<DistributedTokenCache> {
        &self.cache
    }

    /// Get an access token for `resource`.
    ///
    /// A cached token that is not within the expiry margin is returned without
    /// contacting the identity provider. Otherwise a refresh token for the same
    /// client and user is redeemed once; there are no automatic retries.
    pub async fn get_token(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        resource: &str,
        credential: &ClientCredential,
    ) -> TailspinResult<AccessToken> {
        let cache_key = TokenCacheKey::new(user_id.clone(), tenant_id.clone());
        let token_key = TokenKey::new(credential.client_id(), resource, user_id.clone());
        let mut entry = self.cache.load(&cache_key).await;

        let now = self.clock.now();
        let margin = self.cache.config().expiry_margin;
        if let Some(cached) = entry.get(&token_key) {
            if !cached.is_expired_at(now, margin) {
                tracing::trace!(
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    resource = %resource,
                    "Serving access token from cache"
                );
                return Ok(cached.to_access_token());
            }
        }

        let Some((refresh_key, refresh_token)) = entry
            .find_refresh_token(&token_key)
            .map(|(k, rt)| (k.clone(), rt.to_string()))
        else {
            tracing::info!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                resource = %resource,
                "No refresh token available, interactive sign-in required"
            );
            return Err(TailspinError::acquisition_required(
                "no cached token or refresh token",
            ));
        };

        let request = TokenRequest {
            tenant_id: tenant_id.clone(),
            resource: resource.to_string(),
            credential: credential.clone(),
            grant: Grant::RefreshToken {
                refresh_token: refresh_token.clone(),
            },
        };

        match self.call_provider(request).await {
            Ok(response) => {
                let token = cached_token_from(response, Some(refresh_token), resource);
                let access_token = token.to_access_token();
                entry.insert(token_key, token);
                self.cache.save(&cache_key, &entry).await;

                tracing::debug!(
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    resource = %resource,
                    "Renewed access token with refresh token"
                );
                Ok(access_token)
            }
            Err(e) if is_grant_rejection(&e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    resource = %resource,
                    error = %e,
                    "Refresh token rejected, dropping it"
                );
                drop_refresh_token(&mut entry, &refresh_key);
                self.cache.save(&cache_key, &entry).await;
                Err(TailspinError::acquisition_required("refresh token rejected"))
            }
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    resource = %resource,
                    error = %e,
                    "Silent token renewal failed"
                );
                Err(e)
            }
        }
    }

    /// Redeem an authorization code received during sign-in and cache the
    /// resulting tokens.
    pub async fn redeem_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
        user_id: &UserId,
        tenant_id: &TenantId,
        resource: &str,
        credential: &ClientCredential,
    ) -> TailspinResult<AccessToken> {
        let request = TokenRequest {
            tenant_id: tenant_id.clone(),
            resource: resource.to_string(),
            credential: credential.clone(),
            grant: Grant::AuthorizationCode {
                code: code.to_string(),
                redirect_uri: redirect_uri.to_string(),
            },
        };
        let response = self.call_provider(request).await?;

        let cache_key = TokenCacheKey::new(user_id.clone(), tenant_id.clone());
        let token_key = TokenKey::new(credential.client_id(), resource, user_id.clone());
        let token = cached_token_from(response, None, resource);
        let access_token = token.to_access_token();

        let mut entry = self.cache.load(&cache_key).await;
        entry.insert(token_key, token);
        self.cache.save(&cache_key, &entry).await;

        tracing::debug!(
            tenant_id = %tenant_id,
            user_id = %user_id,
            resource = %resource,
            "Redeemed authorization code"
        );
        Ok(access_token)
    }

    async fn call_provider(&self, request: TokenRequest) -> TailspinResult<TokenResponse> {
        let tenant_id = request.tenant_id.clone();
        match tokio::time::timeout(self.request_timeout, self.provider.acquire_token(request))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Identity provider request timed out"
                );
                Err(TailspinError::acquisition_required(
                    "identity provider request timed out",
                ))
            }
        }
    }
}

impl std::fmt::Debug for TokenAcquisitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAcquisitionService")
            .field("cache", &self.cache)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Build the cached token. A response without a refresh token keeps the one
/// that was redeemed.
fn cached_token_from(
    response: TokenResponse,
    previous_refresh_token: Option<String>,
    resource: &str,
) -> CachedToken {
    CachedToken::new(
        response.access_token,
        response.refresh_token.or(previous_refresh_token),
        response.expires_on,
        resource,
    )
}

/// OAuth error codes meaning the refresh token itself is no longer usable.
const GRANT_REJECTION_CODES: &[&str] = &["invalid_grant", "interaction_required"];

/// The provider refused the refresh token itself. Other 4xx responses, such
/// as `invalid_client`, are configuration or request problems and leave the
/// refresh token in place.
fn is_grant_rejection(err: &TailspinError) -> bool {
    match err {
        TailspinError::Token(TokenError::IdentityProvider { code, .. }) => {
            GRANT_REJECTION_CODES.contains(&code.as_str())
        }
        _ => false,
    }
}

fn drop_refresh_token(entry: &mut TokenCacheEntry, key: &TokenKey) {
    if let Some(token) = entry.remove(key) {
        let stripped = CachedToken::new(
            token.access_token(),
            None,
            token.expires_on(),
            token.resource(),
        );
        entry.insert(key.clone(), stripped);
    }
}
