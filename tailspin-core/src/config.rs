//! Configuration for the authentication core.
//!
//! Every component receives its configuration by value at construction time.
//! Nothing here is mutated after startup.

use crate::error::{ConfigError, TailspinResult};
use crate::provider::ClientCredential;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default authority host for Azure AD.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default issuer template for Azure AD v1 tokens.
pub const DEFAULT_ISSUER_TEMPLATE: &str = "https://sts.windows.net/{tenantid}/";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// AZURE AD
// ============================================================================

/// Application registration in the identity provider.
#[derive(Clone)]
pub struct AzureAdConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Authority host, without tenant segment.
    pub authority: String,
    /// Resource id of the Web API the front end calls.
    pub web_api_resource_id: String,
    /// Redirect URI registered for the authorization code flow.
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    /// Issuer stored for newly registered tenants.
    pub issuer_template: String,
}

impl std::fmt::Debug for AzureAdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAdConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authority", &self.authority)
            .field("web_api_resource_id", &self.web_api_resource_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("post_logout_redirect_uri", &self.post_logout_redirect_uri)
            .field("issuer_template", &self.issuer_template)
            .finish()
    }
}

impl Default for AzureAdConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: SecretString::new("".into()),
            authority: DEFAULT_AUTHORITY.to_string(),
            web_api_resource_id: String::new(),
            redirect_uri: "https://localhost:44300/".to_string(),
            post_logout_redirect_uri: "https://localhost:44300/".to_string(),
            issuer_template: DEFAULT_ISSUER_TEMPLATE.to_string(),
        }
    }
}

impl AzureAdConfig {
    /// Load from environment variables.
    ///
    /// # Environment Variables
    /// - `TAILSPIN_AAD_CLIENT_ID`
    /// - `TAILSPIN_AAD_CLIENT_SECRET`
    /// - `TAILSPIN_AAD_AUTHORITY` (default: `https://login.microsoftonline.com`)
    /// - `TAILSPIN_AAD_WEB_API_RESOURCE_ID`
    /// - `TAILSPIN_AAD_REDIRECT_URI`
    /// - `TAILSPIN_AAD_POST_LOGOUT_REDIRECT_URI`
    /// - `TAILSPIN_AAD_ISSUER_TEMPLATE` (default: `https://sts.windows.net/{tenantid}/`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: env_or("TAILSPIN_AAD_CLIENT_ID", ""),
            client_secret: SecretString::new(env_or("TAILSPIN_AAD_CLIENT_SECRET", "").into()),
            authority: env_or("TAILSPIN_AAD_AUTHORITY", &defaults.authority),
            web_api_resource_id: env_or("TAILSPIN_AAD_WEB_API_RESOURCE_ID", ""),
            redirect_uri: env_or("TAILSPIN_AAD_REDIRECT_URI", &defaults.redirect_uri),
            post_logout_redirect_uri: env_or(
                "TAILSPIN_AAD_POST_LOGOUT_REDIRECT_URI",
                &defaults.post_logout_redirect_uri,
            ),
            issuer_template: env_or("TAILSPIN_AAD_ISSUER_TEMPLATE", &defaults.issuer_template),
        }
    }

    /// Client credential built from the shared secret.
    pub fn client_credential(&self) -> ClientCredential {
        ClientCredential::secret(
            self.client_id.clone(),
            self.client_secret.expose_secret().to_string(),
        )
    }

    /// Token endpoint for a tenant.
    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/token",
            self.authority.trim_end_matches('/'),
            tenant_id
        )
    }

    pub fn validate(&self) -> TailspinResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "TAILSPIN_AAD_CLIENT_ID".to_string(),
            }
            .into());
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "TAILSPIN_AAD_CLIENT_SECRET".to_string(),
            }
            .into());
        }
        if !self.authority.starts_with("https://") && !self.authority.starts_with("http://") {
            return Err(ConfigError::InvalidValue {
                field: "TAILSPIN_AAD_AUTHORITY".to_string(),
                value: self.authority.clone(),
                reason: "must be an absolute http(s) URL".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// TOKEN CACHE
// ============================================================================

/// Distributed token cache settings.
#[derive(Debug, Clone)]
pub struct TokenCacheConfig {
    /// Prefix for backend keys.
    pub key_prefix: String,
    /// TTL handed to the backend on write. `None` leaves eviction to the backend.
    pub entry_ttl: Option<Duration>,
    /// Tokens expiring within this margin are treated as expired.
    pub expiry_margin: chrono::Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "tokencache".to_string(),
            entry_ttl: Some(Duration::from_secs(14 * 24 * 3600)),
            expiry_margin: chrono::Duration::minutes(5),
        }
    }
}

impl TokenCacheConfig {
    /// - `TAILSPIN_TOKEN_CACHE_PREFIX` (default: `tokencache`)
    /// - `TAILSPIN_TOKEN_CACHE_TTL_SECS` (default: 14 days, `0` disables)
    /// - `TAILSPIN_TOKEN_EXPIRY_MARGIN_SECS` (default: 300)
    pub fn from_env() -> Self {
        let ttl_secs: u64 = env_parse("TAILSPIN_TOKEN_CACHE_TTL_SECS", 14 * 24 * 3600);
        Self {
            key_prefix: env_or("TAILSPIN_TOKEN_CACHE_PREFIX", "tokencache"),
            entry_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            expiry_margin: chrono::Duration::seconds(env_parse(
                "TAILSPIN_TOKEN_EXPIRY_MARGIN_SECS",
                300,
            )),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.entry_ttl = ttl;
        self
    }

    pub fn with_expiry_margin(mut self, margin: chrono::Duration) -> Self {
        self.expiry_margin = margin;
        self
    }
}

// ============================================================================
// ISSUER POLICY
// ============================================================================

/// Read-through cache settings for the issuer validation policy.
#[derive(Debug, Clone)]
pub struct IssuerPolicyConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for IssuerPolicyConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
        }
    }
}

impl IssuerPolicyConfig {
    /// - `TAILSPIN_ISSUER_CACHE_TTL_SECS` (default: 300)
    /// - `TAILSPIN_ISSUER_CACHE_CAPACITY` (default: 10000)
    pub fn from_env() -> Self {
        Self {
            cache_ttl: Duration::from_secs(env_parse("TAILSPIN_ISSUER_CACHE_TTL_SECS", 300)),
            cache_capacity: env_parse("TAILSPIN_ISSUER_CACHE_CAPACITY", 10_000),
        }
    }
}

// ============================================================================
// IDENTITY PROVIDER
// ============================================================================

/// Settings for calls to the identity provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderConfig {
    /// - `TAILSPIN_PROVIDER_TIMEOUT_MS` (default: 10000)
    pub fn from_env() -> Self {
        Self {
            request_timeout: Duration::from_millis(env_parse(
                "TAILSPIN_PROVIDER_TIMEOUT_MS",
                10_000,
            )),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// All authentication core settings.
#[derive(Debug, Clone, Default)]
pub struct TailspinConfig {
    pub azure_ad: AzureAdConfig,
    pub token_cache: TokenCacheConfig,
    pub issuer_policy: IssuerPolicyConfig,
    pub provider: ProviderConfig,
}

impl TailspinConfig {
    pub fn from_env() -> Self {
        Self {
            azure_ad: AzureAdConfig::from_env(),
            token_cache: TokenCacheConfig::from_env(),
            issuer_policy: IssuerPolicyConfig::from_env(),
            provider: ProviderConfig::from_env(),
        }
    }

    pub fn validate(&self) -> TailspinResult<()> {
        self.azure_ad.validate()?;

        if self.provider.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "TAILSPIN_PROVIDER_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            }
            .into());
        }
        if self.token_cache.expiry_margin < chrono::Duration::zero() {
            return Err(ConfigError::InvalidValue {
                field: "TAILSPIN_TOKEN_EXPIRY_MARGIN_SECS".to_string(),
                value: self.token_cache.expiry_margin.num_seconds().to_string(),
                reason: "margin must not be negative".to_string(),
            }
            .into());
        }
        if self.issuer_policy.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TAILSPIN_ISSUER_CACHE_CAPACITY".to_string(),
                value: "0".to_string(),
                reason: "capacity must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
