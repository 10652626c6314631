//! Error types for Tailspin authentication operations

use thiserror::Error;

/// Distributed token cache errors.
///
/// None of these ever reach a caller of the token cache service: reads degrade
/// to a cache miss and writes degrade to a no-op. They exist so backends and
/// the serializer can report what went wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Reading from cache failed for key {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Writing to cache failed for key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Removing cache entry {key} failed: {reason}")]
    RemoveFailed { key: String, reason: String },

    #[error("Corrupt token cache data: {reason}")]
    CorruptData { reason: String },
}

/// Token acquisition errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The caller must send the user through interactive sign-in again.
    #[error("Interactive sign-in required: {reason}")]
    AcquisitionRequired { reason: String },

    /// The identity provider failed or returned an unexpected response.
    #[error("Identity provider error ({code}): {description}")]
    IdentityProvider {
        status: Option<u16>,
        code: String,
        description: String,
    },
}

/// Trust and authorization policy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("Issuer {issuer} is not trusted for tenant {tenant_id}")]
    UntrustedIssuer { issuer: String, tenant_id: String },

    #[error("Required claim missing: {claim}")]
    MissingClaim { claim: String },

    #[error("Invalid bearer token: {reason}")]
    InvalidToken { reason: String },

    #[error("Bearer token has expired")]
    TokenExpired,

    #[error("Policy {policy} not satisfied for user {user_id}")]
    PolicyNotSatisfied { policy: String, user_id: String },
}

/// Tenant store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Tenant store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Tenant store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tailspin errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TailspinError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for Tailspin operations.
pub type TailspinResult<T> = Result<T, TailspinError>;

impl TailspinError {
    /// Shorthand for [`TokenError::AcquisitionRequired`].
    pub fn acquisition_required(reason: impl Into<String>) -> Self {
        TailspinError::Token(TokenError::AcquisitionRequired {
            reason: reason.into(),
        })
    }

    /// Shorthand for [`TrustError::UntrustedIssuer`].
    pub fn untrusted_issuer(issuer: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        TailspinError::Trust(TrustError::UntrustedIssuer {
            issuer: issuer.into(),
            tenant_id: tenant_id.into(),
        })
    }

    /// True when the caller must re-run interactive sign-in.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            TailspinError::Token(TokenError::AcquisitionRequired { .. })
        )
    }

    /// True for trust failures. These are terminal for the request.
    pub fn is_trust_failure(&self) -> bool {
        matches!(self, TailspinError::Trust(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let cache = TailspinError::from(CacheError::CorruptData {
            reason: "unsupported format version 2".to_string(),
        });
        assert!(matches!(cache, TailspinError::Cache(_)));

        let token = TailspinError::from(TokenError::AcquisitionRequired {
            reason: "no refresh token".to_string(),
        });
        assert!(token.requires_sign_in());

        let trust = TailspinError::untrusted_issuer("https://login/t2", "t2");
        assert!(trust.is_trust_failure());
        assert!(!trust.requires_sign_in());

        let store = TailspinError::from(StoreError::LockPoisoned);
        assert!(matches!(store, TailspinError::Store(_)));
    }

    #[test]
    fn test_error_display_is_transparent() {
        let err = TailspinError::untrusted_issuer("https://login/t2", "t2");
        assert_eq!(
            err.to_string(),
            "Issuer https://login/t2 is not trusted for tenant t2"
        );
    }
}
