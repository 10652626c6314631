//! Authentication event handlers.
//!
//! The sign-in pipeline raises an [`AuthEvent`] at each step. Handlers
//! register tenants on first sign-in, warm the token cache with the redeemed
//! authorization code, hide identity provider detail from the browser, and
//! clear cached tokens on sign-out.

use crate::acquisition::TokenAcquisitionService;
use crate::issuer::IssuerValidationPolicy;
use crate::principal::{AadClaims, Principal};
use serde::Serialize;
use std::sync::Arc;
use tailspin_core::{
    issuer_matches, AccessToken, AzureAdConfig, Clock, RegisteredTenant, TailspinError,
    TailspinResult, TenantId,
};

/// Message shown to users whenever authentication fails.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Access is forbidden. Please try signing in again.";

// ============================================================================
// CONTEXTS
// ============================================================================

#[derive(Debug, Clone)]
pub struct TokenValidatedContext {
    pub claims: AadClaims,
}

#[derive(Debug, Clone)]
pub struct AuthorizationCodeReceivedContext {
    pub principal: Principal,
    pub code: String,
    /// Redirect URI used in the authorization request. Defaults to the
    /// configured one.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthenticationFailedContext {
    pub error: String,
    pub error_description: Option<String>,
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone)]
pub struct SignedOutContext {
    pub principal: Principal,
}

/// Events raised by the sign-in pipeline.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    TokenValidated(TokenValidatedContext),
    AuthorizationCodeReceived(AuthorizationCodeReceivedContext),
    AuthenticationFailed(AuthenticationFailedContext),
    SignedOut(SignedOutContext),
}

impl AuthEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::TokenValidated(_) => "TokenValidated",
            AuthEvent::AuthorizationCodeReceived(_) => "AuthorizationCodeReceived",
            AuthEvent::AuthenticationFailed(_) => "AuthenticationFailed",
            AuthEvent::SignedOut(_) => "SignedOut",
        }
    }
}

/// What the pipeline should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    SignedIn { principal: Principal },
    TokensCached,
    Forbidden { message: String },
    SignedOut { redirect_uri: String },
}

impl AuthOutcome {
    pub fn forbidden() -> Self {
        AuthOutcome::Forbidden {
            message: GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Callback table for the sign-in pipeline.
pub struct AuthenticationEvents {
    policy: Arc<IssuerValidationPolicy>,
    acquisition: Arc<TokenAcquisitionService>,
    azure_ad: AzureAdConfig,
    clock: Arc<dyn Clock>,
}

impl AuthenticationEvents {
    pub fn new(
        policy: Arc<IssuerValidationPolicy>,
        acquisition: Arc<TokenAcquisitionService>,
        azure_ad: AzureAdConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            acquisition,
            azure_ad,
            clock,
        }
    }

    /// Dispatch an event. Failures are logged and mapped to a generic
    /// [`AuthOutcome::Forbidden`].
    pub async fn handle(&self, event: AuthEvent) -> AuthOutcome {
        let event_type = event.event_type();
        let result = match event {
            AuthEvent::TokenValidated(ctx) => self
                .on_token_validated(ctx)
                .await
                .map(|principal| AuthOutcome::SignedIn { principal }),
            AuthEvent::AuthorizationCodeReceived(ctx) => self
                .on_authorization_code_received(ctx)
                .await
                .map(|_| AuthOutcome::TokensCached),
            AuthEvent::AuthenticationFailed(ctx) => Ok(self.on_authentication_failed(ctx)),
            AuthEvent::SignedOut(ctx) => Ok(self.on_signed_out(ctx).await),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(event = event_type, error = %e, "Authentication event failed");
            AuthOutcome::forbidden()
        })
    }

    /// Build the principal and register its tenant on first sign-in.
    ///
    /// A new tenant is only registered when its issuer comes from the
    /// configured authority. Known tenants must present the issuer recorded at
    /// registration.
    pub async fn on_token_validated(
        &self,
        ctx: TokenValidatedContext,
    ) -> TailspinResult<Principal> {
        let principal = Principal::from_claims(&ctx.claims)?;
        let tenant_id = &principal.tenant_id;
        let issuer = principal.issuer.as_str();

        match self.policy.find_tenant(tenant_id).await? {
            Some(existing) if existing.matches_issuer(issuer) => {}
            Some(existing) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    issuer = %issuer,
                    expected = %existing.issuer_value,
                    "Sign-in issuer does not match registered tenant"
                );
                return Err(TailspinError::untrusted_issuer(issuer, tenant_id.as_str()));
            }
            None => {
                if !issuer_matches(&self.azure_ad.issuer_template, tenant_id.as_str(), issuer) {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        issuer = %issuer,
                        "Refusing to register tenant with foreign issuer"
                    );
                    return Err(TailspinError::untrusted_issuer(issuer, tenant_id.as_str()));
                }

                let tenant = RegisteredTenant::new(tenant_id.clone(), issuer, self.clock.now());
                let stored = self.policy.register(tenant).await?;
                // Lost a registration race to a different issuer
                if !stored.matches_issuer(issuer) {
                    return Err(TailspinError::untrusted_issuer(issuer, tenant_id.as_str()));
                }
                tracing::info!(
                    tenant_id = %tenant_id,
                    issuer = %issuer,
                    "Registered tenant on first sign-in"
                );
            }
        }

        tracing::debug!(
            tenant_id = %principal.tenant_id,
            user_id = %principal.user_id,
            roles = principal.roles.len(),
            "Token validated"
        );
        Ok(principal)
    }

    /// Redeem the authorization code for the Web API resource so the first
    /// API call is served from the token cache.
    pub async fn on_authorization_code_received(
        &self,
        ctx: AuthorizationCodeReceivedContext,
    ) -> TailspinResult<AccessToken> {
        let redirect_uri = ctx
            .redirect_uri
            .unwrap_or_else(|| self.azure_ad.redirect_uri.clone());
        self.acquisition
            .redeem_authorization_code(
                &ctx.code,
                &redirect_uri,
                &ctx.principal.user_id,
                &ctx.principal.tenant_id,
                &self.azure_ad.web_api_resource_id,
                &self.azure_ad.client_credential(),
            )
            .await
    }

    /// Log the provider's error and return a generic outcome.
    pub fn on_authentication_failed(&self, ctx: AuthenticationFailedContext) -> AuthOutcome {
        tracing::error!(
            error = %ctx.error,
            error_description = ctx.error_description.as_deref().unwrap_or(""),
            tenant_id = ctx.tenant_id.as_ref().map(|t| t.as_str()).unwrap_or(""),
            "Authentication failed"
        );
        AuthOutcome::forbidden()
    }

    /// Drop the user's cached tokens.
    pub async fn on_signed_out(&self, ctx: SignedOutContext) -> AuthOutcome {
        self.acquisition
            .cache()
            .clear(&ctx.principal.token_cache_key())
            .await;
        AuthOutcome::SignedOut {
            redirect_uri: self.azure_ad.post_logout_redirect_uri.clone(),
        }
    }
}

impl std::fmt::Debug for AuthenticationEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationEvents")
            .field("azure_ad", &self.azure_ad)
            .finish()
    }
}
