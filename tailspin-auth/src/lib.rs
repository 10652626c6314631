//! Tailspin Auth - token caching and multi-tenant trust
//!
//! - [`serializer`]: stored JSON form of a user's token cache entry.
//! - [`DistributedTokenCache`]: per-user token storage over a
//!   [`CacheBackend`](tailspin_storage::CacheBackend) that never fails its
//!   callers.
//! - [`TokenAcquisitionService`]: cached access tokens with silent refresh.
//! - [`HttpIdentityProvider`]: OAuth2 token endpoint client.
//! - [`IssuerValidationPolicy`]: accepts tokens only from registered tenants.
//! - [`AuthenticationEvents`]: sign-in pipeline callbacks.
//! - [`BearerValidator`] and [`AuthorizationPolicy`]: Web API request checks.

pub mod acquisition;
pub mod bearer;
pub mod events;
pub mod http_provider;
pub mod issuer;
pub mod policy;
pub mod principal;
pub mod serializer;
pub mod token_cache;

pub use acquisition::TokenAcquisitionService;
pub use bearer::{BearerConfig, BearerKey, BearerValidator};
pub use events::{
    AuthEvent, AuthOutcome, AuthenticationEvents, AuthenticationFailedContext,
    AuthorizationCodeReceivedContext, SignedOutContext, TokenValidatedContext,
    GENERIC_FAILURE_MESSAGE,
};
pub use http_provider::HttpIdentityProvider;
pub use issuer::IssuerValidationPolicy;
pub use policy::AuthorizationPolicy;
pub use principal::{AadClaims, Principal, RolesClaim, SurveyRole};
pub use token_cache::{DistributedTokenCache, TokenCacheStats};
