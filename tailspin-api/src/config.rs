//! API Configuration Module
//!
//! Server settings for the Web API: bind address, bearer token verification,
//! logging format, CORS and the distributed cache backend. Loaded once from
//! `TAILSPIN_*` environment variables.

use crate::error::{ApiError, ApiResult};
use crate::telemetry::LogFormat;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::time::Duration;
use tailspin_auth::{BearerConfig, BearerKey};

/// Where serialized token cache entries live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Process-local map. Tokens are lost on restart.
    Memory,
    /// Shared Redis server.
    Redis { url: String },
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    // ========================================================================
    // Bearer Token Verification
    // ========================================================================
    /// HS256 signing secret. Takes precedence over `bearer_rsa_pem`.
    pub bearer_secret: Option<SecretString>,

    /// RS256 public key in PEM form.
    pub bearer_rsa_pem: Option<String>,

    /// Expected `aud` claim. Unchecked when unset.
    pub audience: Option<String>,

    /// Allowed clock skew for `exp` and `nbf`.
    pub clock_skew_secs: i64,

    // ========================================================================
    // Server
    // ========================================================================
    pub log_format: LogFormat,

    pub cache_backend: CacheBackendKind,

    /// Allowed CORS origins. Empty allows all origins.
    pub cors_origins: Vec<String>,

    pub cors_max_age_secs: u64,

    /// Maximum in-flight requests.
    pub concurrency_limit: usize,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("bearer_secret", &self.bearer_secret.as_ref().map(|_| "[REDACTED]"))
            .field("bearer_rsa_pem", &self.bearer_rsa_pem.as_ref().map(|_| ".."))
            .field("audience", &self.audience)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("log_format", &self.log_format)
            .field("cache_backend", &self.cache_backend)
            .field("cors_origins", &self.cors_origins)
            .field("cors_max_age_secs", &self.cors_max_age_secs)
            .field("concurrency_limit", &self.concurrency_limit)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            bearer_secret: None,
            bearer_rsa_pem: None,
            audience: None,
            clock_skew_secs: 300,
            log_format: LogFormat::Pretty,
            cache_backend: CacheBackendKind::Memory,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            concurrency_limit: 1024,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TAILSPIN_API_BIND`: Host to bind (default: 0.0.0.0)
    /// - `PORT` or `TAILSPIN_API_PORT`: Port to bind (default: 3000)
    /// - `TAILSPIN_BEARER_SECRET`: HS256 signing secret
    /// - `TAILSPIN_BEARER_RSA_PEM`: RS256 public key (PEM)
    /// - `TAILSPIN_BEARER_AUDIENCE`: Expected audience
    /// - `TAILSPIN_BEARER_CLOCK_SKEW_SECS`: Allowed skew (default: 300)
    /// - `TAILSPIN_LOG_FORMAT`: "pretty" or "json" (default: pretty)
    /// - `TAILSPIN_CACHE_BACKEND`: "memory" or "redis" (default: memory)
    /// - `TAILSPIN_REDIS_URL`: Redis URL when the backend is redis
    /// - `TAILSPIN_CORS_ORIGINS`: Comma-separated allowed origins
    /// - `TAILSPIN_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `TAILSPIN_CONCURRENCY_LIMIT`: Max in-flight requests (default: 1024)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = non_empty("TAILSPIN_API_BIND").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = non_empty("PORT")
            .or_else(|| non_empty("TAILSPIN_API_PORT"))
            .unwrap_or_else(|| defaults.bind_addr.port().to_string());
        let port = port
            .parse::<u16>()
            .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port)))?;
        let addr = format!("{}:{}", host, port);
        let bind_addr = addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })?;

        let log_format = match non_empty("TAILSPIN_LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => defaults.log_format,
        };

        let cache_backend = match non_empty("TAILSPIN_CACHE_BACKEND")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            None | Some("memory") => CacheBackendKind::Memory,
            Some("redis") => CacheBackendKind::Redis {
                url: non_empty("TAILSPIN_REDIS_URL")
                    .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            },
            Some(other) => {
                return Err(ApiError::invalid_input(format!(
                    "Unknown cache backend: {} (expected memory or redis)",
                    other
                )))
            }
        };

        let cors_origins = non_empty("TAILSPIN_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            bearer_secret: non_empty("TAILSPIN_BEARER_SECRET").map(|s| SecretString::new(s.into())),
            bearer_rsa_pem: non_empty("TAILSPIN_BEARER_RSA_PEM"),
            audience: non_empty("TAILSPIN_BEARER_AUDIENCE"),
            clock_skew_secs: non_empty("TAILSPIN_BEARER_CLOCK_SKEW_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clock_skew_secs),
            log_format,
            cache_backend,
            cors_origins,
            cors_max_age_secs: non_empty("TAILSPIN_CORS_MAX_AGE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
            concurrency_limit: non_empty("TAILSPIN_CONCURRENCY_LIMIT")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency_limit),
        })
    }

    /// Bearer verification settings. A signing key is required.
    pub fn bearer_config(&self) -> ApiResult<BearerConfig> {
        let key = match (&self.bearer_secret, &self.bearer_rsa_pem) {
            (Some(secret), _) if !secret.expose_secret().is_empty() => {
                BearerKey::Hmac(secret.clone())
            }
            (_, Some(pem)) => BearerKey::RsaPem(pem.clone()),
            _ => {
                return Err(ApiError::invalid_input(
                    "Set TAILSPIN_BEARER_SECRET or TAILSPIN_BEARER_RSA_PEM",
                ))
            }
        };

        if self.clock_skew_secs < 0 {
            return Err(ApiError::invalid_input(
                "TAILSPIN_BEARER_CLOCK_SKEW_SECS must not be negative",
            ));
        }

        Ok(BearerConfig {
            key,
            audience: self.audience.clone(),
            clock_skew_secs: self.clock_skew_secs,
        })
    }

    pub fn cors_max_age(&self) -> Duration {
        Duration::from_secs(self.cors_max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() -> ApiResult<()> {
        let config = ApiConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.cache_backend, CacheBackendKind::Memory);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.cors_origins.is_empty());
        Ok(())
    }

    #[test]
    fn test_port_precedence_and_redis() -> ApiResult<()> {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("TAILSPIN_API_PORT", "9090"),
            ("TAILSPIN_API_BIND", "127.0.0.1"),
            ("TAILSPIN_CACHE_BACKEND", "Redis"),
            ("TAILSPIN_REDIS_URL", "redis://cache:6379"),
            ("TAILSPIN_LOG_FORMAT", "json"),
            ("TAILSPIN_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]))?;
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(
            config.cache_backend,
            CacheBackendKind::Redis {
                url: "redis://cache:6379".to_string()
            }
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ApiConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("TAILSPIN_CACHE_BACKEND", "lmdb")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("TAILSPIN_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_bearer_config_requires_key() -> ApiResult<()> {
        let config = ApiConfig::default();
        assert!(config.bearer_config().is_err());

        let config = ApiConfig::from_lookup(lookup(&[
            ("TAILSPIN_BEARER_SECRET", "s3cret"),
            ("TAILSPIN_BEARER_RSA_PEM", "-----BEGIN PUBLIC KEY-----"),
            ("TAILSPIN_BEARER_AUDIENCE", "https://surveys/api"),
        ]))?;
        let bearer = config.bearer_config()?;
        assert!(matches!(bearer.key, BearerKey::Hmac(_)));
        assert_eq!(bearer.audience.as_deref(), Some("https://surveys/api"));
        Ok(())
    }

    #[test]
    fn test_debug_redacts_secret() -> ApiResult<()> {
        let config = ApiConfig::from_lookup(lookup(&[("TAILSPIN_BEARER_SECRET", "s3cret")]))?;
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
        Ok(())
    }
}
