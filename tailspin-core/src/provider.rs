//! Identity provider abstraction.
//!
//! The token acquisition service talks to the identity provider only through
//! [`IdentityProvider`]. Concrete clients live in `tailspin-auth`; mocks live
//! in `tailspin-test-utils`.

use crate::error::TailspinResult;
use crate::identity::{TenantId, Timestamp};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Credential the application presents to the token endpoint.
#[derive(Clone)]
pub enum ClientCredential {
    /// Shared client secret.
    Secret {
        client_id: String,
        secret: SecretString,
    },
    /// Pre-signed JWT client assertion (certificate credential).
    Assertion { client_id: String, assertion: String },
}

impl ClientCredential {
    pub fn secret(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        ClientCredential::Secret {
            client_id: client_id.into(),
            secret: SecretString::new(secret.into()),
        }
    }

    pub fn assertion(client_id: impl Into<String>, assertion: impl Into<String>) -> Self {
        ClientCredential::Assertion {
            client_id: client_id.into(),
            assertion: assertion.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            ClientCredential::Secret { client_id, .. } => client_id,
            ClientCredential::Assertion { client_id, .. } => client_id,
        }
    }

    /// Form parameters authenticating the client on a token request.
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        match self {
            ClientCredential::Secret { client_id, secret } => vec![
                ("client_id", client_id.clone()),
                ("client_secret", secret.expose_secret().to_string()),
            ],
            ClientCredential::Assertion {
                client_id,
                assertion,
            } => vec![
                ("client_id", client_id.clone()),
                (
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                ),
                ("client_assertion", assertion.clone()),
            ],
        }
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCredential::Secret { client_id, .. } => f
                .debug_struct("Secret")
                .field("client_id", client_id)
                .field("secret", &"[REDACTED]")
                .finish(),
            ClientCredential::Assertion { client_id, .. } => f
                .debug_struct("Assertion")
                .field("client_id", client_id)
                .field("assertion", &"[REDACTED]")
                .finish(),
        }
    }
}

/// The grant being redeemed.
#[derive(Clone)]
pub enum Grant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::AuthorizationCode { redirect_uri, .. } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"[REDACTED]")
                .field("redirect_uri", redirect_uri)
                .finish(),
            Grant::RefreshToken { .. } => f
                .debug_struct("RefreshToken")
                .field("refresh_token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// A token request against a tenant's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub tenant_id: TenantId,
    pub resource: String,
    pub credential: ClientCredential,
    pub grant: Grant,
}

/// Tokens issued by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_on: Timestamp,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// OAuth2 / OIDC token endpoint.
///
/// Implementations report every provider error as
/// `TokenError::IdentityProvider` carrying the OAuth `error` code and HTTP
/// status. A rejected grant is told apart by its code (`invalid_grant`,
/// `interaction_required`), not by the status alone.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Redeem a grant for tokens.
    async fn acquire_token(&self, request: TokenRequest) -> TailspinResult<TokenResponse>;
}
