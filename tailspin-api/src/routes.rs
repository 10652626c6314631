//! HTTP routes.
//!
//! - `GET /health`: liveness, no authentication.
//! - `GET /api/me`: the authenticated principal.
//! - `GET /api/token-status`: whether a downstream token can be obtained
//!   silently (survey creators).
//! - `GET /api/token-cache/stats`: token cache counters (survey admins).
//! - `POST /api/signout`: drop the caller's cached tokens.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tailspin_auth::{
    AuthEvent, AuthOutcome, AuthenticationEvents, AuthorizationPolicy, DistributedTokenCache,
    SignedOutContext, SurveyRole, TokenAcquisitionService, TokenCacheStats,
};
use tailspin_core::{AzureAdConfig, Timestamp};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::middleware::{bearer_auth_middleware, AuthExtractor};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub roles: BTreeSet<SurveyRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenStatusQuery {
    /// Downstream resource. Defaults to the Web API resource.
    pub resource: Option<String>,
}

/// Token metadata. The token itself never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatusResponse {
    pub resource: String,
    pub expires_on: Timestamp,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn me(auth: AuthExtractor) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth.user_id.to_string(),
        tenant_id: auth.tenant_id.to_string(),
        display_name: auth.display_name.clone(),
        roles: auth.roles.clone(),
    })
}

async fn token_status(
    State(acquisition): State<Arc<TokenAcquisitionService>>,
    State(azure_ad): State<Arc<AzureAdConfig>>,
    auth: AuthExtractor,
    Query(query): Query<TokenStatusQuery>,
) -> ApiResult<Json<TokenStatusResponse>> {
    let principal = auth.require(AuthorizationPolicy::RequireSurveyCreator)?;
    let resource = query
        .resource
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| azure_ad.web_api_resource_id.clone());

    let token = acquisition
        .get_token(
            &principal.user_id,
            &principal.tenant_id,
            &resource,
            &azure_ad.client_credential(),
        )
        .await?;

    Ok(Json(TokenStatusResponse {
        resource: token.resource,
        expires_on: token.expires_on,
    }))
}

async fn token_cache_stats(
    State(token_cache): State<Arc<DistributedTokenCache>>,
    auth: AuthExtractor,
) -> ApiResult<Json<TokenCacheStats>> {
    auth.require(AuthorizationPolicy::RequireSurveyAdmin)?;
    Ok(Json(token_cache.stats()))
}

async fn sign_out(
    State(events): State<Arc<AuthenticationEvents>>,
    AuthExtractor(principal): AuthExtractor,
) -> Json<AuthOutcome> {
    Json(
        events
            .handle(AuthEvent::SignedOut(SignedOutContext { principal }))
            .await,
    )
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS
/// 2. Request tracing
/// 3. Concurrency limit
/// 4. Bearer authentication (only on `/api/*`)
pub fn create_router(state: AppState, api_config: &ApiConfig) -> Router {
    let api_routes = Router::new()
        .route("/me", get(me))
        .route("/token-status", get(token_status))
        .route("/token-cache/stats", get(token_cache_stats))
        .route("/signout", post(sign_out))
        .layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(api_config.concurrency_limit))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(api_config))
}

/// In development mode (empty origins) all origins are allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(config.cors_max_age());

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
