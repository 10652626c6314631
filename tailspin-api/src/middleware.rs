//! Axum Middleware for Bearer Authentication
//!
//! [`bearer_auth_middleware`] validates the `Authorization: Bearer` token,
//! checks its issuer against the registered tenants and injects the resulting
//! [`Principal`] into request extensions. Handlers take it back out with
//! [`AuthExtractor`].

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tailspin_auth::{AuthorizationPolicy, Principal};

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Authenticate the request with its bearer token.
///
/// Returns 401 when the header is missing, the token fails verification, or
/// the token's issuer does not belong to a registered tenant.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(bearer_token)
        .transpose()?
        .ok_or_else(|| ApiError::unauthorized("Authentication required: provide a bearer token"))?;

    let principal = match state.bearer.validate(token).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::info!(
                method = %method,
                path = %path,
                error = %e,
                "Bearer authentication failed"
            );
            return Err(e.into());
        }
    };

    tracing::info!(
        method = %method,
        path = %path,
        user_id = %principal.user_id,
        tenant_id = %principal.tenant_id,
        "Authenticated request"
    );

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn bearer_token(header_value: &str) -> ApiResult<&str> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::invalid_token(
            "Authorization header must use Bearer scheme",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::invalid_token("Bearer token is empty"));
    }
    Ok(token)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed extractor for the authenticated [`Principal`].
///
/// `bearer_auth_middleware` must run on the route; without it the extractor
/// rejects with 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "Principal not found in request extensions. \
                     Ensure bearer_auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AuthExtractor {
    /// Reject with 403 unless the principal satisfies `policy`.
    pub fn require(&self, policy: AuthorizationPolicy) -> ApiResult<&Principal> {
        policy.authorize(&self.0)?;
        Ok(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi").ok(), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc").ok(), Some("abc"));
        assert!(bearer_token("Basic dXNlcjpwYXNz").is_err());
        assert!(bearer_token("Bearer ").is_err());
        assert!(bearer_token("Bearer").is_err());
    }
}
