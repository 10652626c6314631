//! Error Types for the Tailspin API
//!
//! - [`ApiError`] is the JSON body of every failed request.
//! - [`ErrorCode`] fixes the HTTP status of each error category.
//! - `From<TailspinError>` maps core failures onto codes. Identity provider
//!   and infrastructure detail is logged here and never sent to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tailspin_auth::GENERIC_FAILURE_MESSAGE;
use tailspin_core::{TailspinError, TokenError, TrustError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Authenticated, but the principal does not satisfy the route's policy
    Forbidden,

    /// Bearer token is malformed, badly signed or from an untrusted issuer
    InvalidToken,

    /// Bearer token has expired
    TokenExpired,

    /// No usable downstream token; the user must sign in interactively again
    SignInRequired,

    /// The identity provider rejected or failed a token request
    AuthenticationFailed,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    InvalidInput,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    InternalError,

    /// A backing store is unreachable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::SignInRequired => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::AuthenticationFailed => StatusCode::BAD_GATEWAY,

            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidToken => "Invalid bearer token",
            ErrorCode::TokenExpired => "Bearer token has expired",
            ErrorCode::SignInRequired => "Interactive sign-in required",
            ErrorCode::AuthenticationFailed => GENERIC_FAILURE_MESSAGE,
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Tells the front end to send the user back through sign-in.
    pub fn sign_in_required() -> Self {
        Self::from_code(ErrorCode::SignInRequired)
            .with_details(serde_json::json!({ "sign_in": true }))
    }

    pub fn authentication_failed() -> Self {
        Self::from_code(ErrorCode::AuthenticationFailed)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<TailspinError> for ApiError {
    fn from(err: TailspinError) -> Self {
        match err {
            TailspinError::Trust(TrustError::UntrustedIssuer { tenant_id, .. }) => {
                ApiError::invalid_token(format!("Tenant {} is not registered", tenant_id))
            }
            TailspinError::Trust(TrustError::MissingClaim { claim }) => {
                ApiError::invalid_token(format!("Required claim '{}' is missing", claim))
            }
            TailspinError::Trust(TrustError::InvalidToken { reason }) => {
                tracing::debug!(reason = %reason, "Bearer token rejected");
                ApiError::from_code(ErrorCode::InvalidToken)
            }
            TailspinError::Trust(TrustError::TokenExpired) => ApiError::token_expired(),
            TailspinError::Trust(TrustError::PolicyNotSatisfied { policy, .. }) => {
                ApiError::forbidden(format!("Policy {} not satisfied", policy))
            }
            TailspinError::Token(TokenError::AcquisitionRequired { .. }) => {
                ApiError::sign_in_required()
            }
            TailspinError::Token(e @ TokenError::IdentityProvider { .. }) => {
                tracing::error!(error = %e, "Identity provider error");
                ApiError::authentication_failed()
            }
            TailspinError::Store(e) => {
                tracing::error!(error = %e, "Tenant store error");
                ApiError::from_code(ErrorCode::ServiceUnavailable)
            }
            TailspinError::Cache(e) => {
                tracing::error!(error = %e, "Token cache error");
                ApiError::from_code(ErrorCode::InternalError)
            }
            TailspinError::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
