//! Tailspin API - HTTP surface for the Surveys Web API
//!
//! Bearer authentication against registered tenants, role-based
//! authorization, and token cache endpoints over the services in
//! `tailspin-auth`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, CacheBackendKind};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{bearer_auth_middleware, AuthExtractor};
pub use routes::create_router;
pub use state::{Adapters, AppState};
pub use telemetry::{init_tracing, LogFormat};
