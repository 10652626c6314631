//! OAuth2 token endpoint client.
//!
//! Sends form-encoded authorization-code and refresh-token grants to
//! `{authority}/{tenant}/oauth2/token`. Request timeouts are applied by the
//! caller.

use async_trait::async_trait;
use chrono::{DateTime, Duration};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tailspin_core::{
    AzureAdConfig, Clock, Grant, IdentityProvider, TailspinResult, Timestamp, TokenError,
    TokenRequest, TokenResponse,
};

/// [`IdentityProvider`] over HTTP.
pub struct HttpIdentityProvider {
    client: Client,
    azure_ad: AzureAdConfig,
    clock: Arc<dyn Clock>,
}

impl HttpIdentityProvider {
    pub fn new(azure_ad: AzureAdConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_client(Client::new(), azure_ad, clock)
    }

    pub fn with_client(client: Client, azure_ad: AzureAdConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            azure_ad,
            clock,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn acquire_token(&self, request: TokenRequest) -> TailspinResult<TokenResponse> {
        let url = self.azure_ad.token_endpoint(request.tenant_id.as_str());

        let mut form = request.credential.form_params();
        form.push(("grant_type", request.grant.grant_type().to_string()));
        form.push(("resource", request.resource.clone()));
        match &request.grant {
            Grant::AuthorizationCode { code, redirect_uri } => {
                form.push(("code", code.clone()));
                form.push(("redirect_uri", redirect_uri.clone()));
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.clone()));
            }
        }

        tracing::debug!(
            tenant_id = %request.tenant_id,
            client_id = %request.credential.client_id(),
            resource = %request.resource,
            grant_type = request.grant.grant_type(),
            "Requesting token from identity provider"
        );

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::IdentityProvider {
                status: None,
                code: "request_failed".to_string(),
                description: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenError::IdentityProvider {
                status: Some(status.as_u16()),
                code: "invalid_response".to_string(),
                description: format!("Failed to read response body: {}", e),
            })?;

        if status.is_success() {
            parse_token_response(&body, self.clock.now()).map_err(Into::into)
        } else {
            Err(parse_error_response(status.as_u16(), &body).into())
        }
    }
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("authority", &self.azure_ad.authority)
            .field("client_id", &self.azure_ad.client_id)
            .finish()
    }
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<Value>,
    expires_on: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Parse a successful token response.
///
/// The endpoint reports numbers either as JSON numbers or as strings.
/// `expires_on` (absolute, unix seconds) wins over `expires_in`.
fn parse_token_response(body: &str, now: Timestamp) -> Result<TokenResponse, TokenError> {
    let raw: RawTokenResponse =
        serde_json::from_str(body).map_err(|e| invalid_response(format!("not JSON: {}", e)))?;

    let access_token = raw
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid_response("missing access_token"))?;

    let expires_on = if let Some(secs) = raw.expires_on.as_ref().and_then(as_i64) {
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| invalid_response(format!("expires_on {} out of range", secs)))?
    } else if let Some(secs) = raw.expires_in.as_ref().and_then(as_i64) {
        now + Duration::seconds(secs)
    } else {
        return Err(invalid_response("missing expires_in and expires_on"));
    };

    Ok(TokenResponse {
        access_token,
        refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
        expires_on,
    })
}

fn parse_error_response(status: u16, body: &str) -> TokenError {
    match serde_json::from_str::<RawErrorResponse>(body) {
        Ok(raw) => TokenError::IdentityProvider {
            status: Some(status),
            code: raw.error.unwrap_or_else(|| format!("http_{}", status)),
            description: raw.error_description.unwrap_or_default(),
        },
        Err(_) => TokenError::IdentityProvider {
            status: Some(status),
            code: format!("http_{}", status),
            description: body.chars().take(256).collect(),
        },
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn invalid_response(description: impl Into<String>) -> TokenError {
    TokenError::IdentityProvider {
        status: None,
        code: "invalid_response".to_string(),
        description: description.into(),
    }
}
