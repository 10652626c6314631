//! Tailspin Core - shared types for multi-tenant authentication
//!
//! Data model for the distributed token cache and tenant registry, the error
//! taxonomy, configuration values, and the identity provider abstraction used
//! by `tailspin-auth`.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod provider;
pub mod tenant;
pub mod token;

pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use config::{
    AzureAdConfig, IssuerPolicyConfig, ProviderConfig, TailspinConfig, TokenCacheConfig,
};
pub use error::{
    CacheError, ConfigError, StoreError, TailspinError, TailspinResult, TokenError, TrustError,
};
pub use identity::{TenantId, Timestamp, UserId};
pub use provider::{ClientCredential, Grant, IdentityProvider, TokenRequest, TokenResponse};
pub use tenant::{expand_issuer_template, issuer_matches, RegisteredTenant};
pub use token::{AccessToken, CachedToken, TokenCacheEntry, TokenCacheKey, TokenKey};
