//! Bearer token validation for the Web API.
//!
//! `jsonwebtoken` checks the signature and audience only. Expiry and
//! not-before are checked here against the injected [`Clock`] with a skew
//! allowance, then the issuer is checked against the registered tenants.

use crate::issuer::IssuerValidationPolicy;
use crate::principal::{AadClaims, Principal};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::sync::Arc;
use tailspin_core::{Clock, ConfigError, TailspinResult, TrustError};

/// Key used to verify bearer token signatures.
#[derive(Clone)]
pub enum BearerKey {
    /// HS256 shared secret.
    Hmac(SecretString),
    /// RS256 public key in PEM form.
    RsaPem(String),
}

impl std::fmt::Debug for BearerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BearerKey::Hmac(_) => f.write_str("Hmac([REDACTED])"),
            BearerKey::RsaPem(_) => f.write_str("RsaPem(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BearerConfig {
    pub key: BearerKey,
    /// Expected `aud`. Audience is not checked when unset.
    pub audience: Option<String>,
    pub clock_skew_secs: i64,
}

/// Validates bearer tokens and resolves them to a [`Principal`].
pub struct BearerValidator {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    audience: Option<String>,
    clock_skew_secs: i64,
    policy: Arc<IssuerValidationPolicy>,
    clock: Arc<dyn Clock>,
}

impl BearerValidator {
    pub fn new(
        config: &BearerConfig,
        policy: Arc<IssuerValidationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> TailspinResult<Self> {
        let (decoding_key, algorithm) = match &config.key {
            BearerKey::Hmac(secret) => {
                if secret.expose_secret().is_empty() {
                    return Err(ConfigError::MissingRequired {
                        field: "TAILSPIN_BEARER_SECRET".to_string(),
                    }
                    .into());
                }
                (
                    DecodingKey::from_secret(secret.expose_secret().as_bytes()),
                    Algorithm::HS256,
                )
            }
            BearerKey::RsaPem(pem) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    ConfigError::InvalidValue {
                        field: "TAILSPIN_BEARER_RSA_PEM".to_string(),
                        value: "[PEM]".to_string(),
                        reason: e.to_string(),
                    }
                })?;
                (key, Algorithm::RS256)
            }
        };

        Ok(Self {
            decoding_key,
            algorithm,
            audience: config.audience.clone(),
            clock_skew_secs: config.clock_skew_secs.max(0),
            policy,
            clock,
        })
    }

    /// Validate a raw bearer token.
    pub async fn validate(&self, token: &str) -> TailspinResult<Principal> {
        let claims = self.decode_claims(token)?;
        let principal = Principal::from_claims(&claims)?;
        self.policy
            .validate(&principal.issuer, &principal.tenant_id)
            .await?;
        Ok(principal)
    }

    fn decode_claims(&self, token: &str) -> TailspinResult<AadClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<AadClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        "signature is invalid".to_string()
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                        "audience is invalid".to_string()
                    }
                    _ => format!("validation failed: {}", e),
                };
                TrustError::InvalidToken { reason }
            })?
            .claims;

        self.check_times(&claims)?;
        Ok(claims)
    }

    fn check_times(&self, claims: &AadClaims) -> Result<(), TrustError> {
        let now = self.clock.now().timestamp();
        let skew = self.clock_skew_secs;

        let exp = claims.exp.ok_or_else(|| TrustError::MissingClaim {
            claim: "exp".to_string(),
        })?;
        if exp < now - skew {
            return Err(TrustError::TokenExpired);
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now + skew {
                return Err(TrustError::InvalidToken {
                    reason: "token is not yet valid".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BearerValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerValidator")
            .field("algorithm", &self.algorithm)
            .field("audience", &self.audience)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .finish()
    }
}
