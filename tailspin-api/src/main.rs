//! Tailspin API Server Entry Point
//!
//! Loads configuration from the environment, wires the authentication
//! services and starts the Axum HTTP server.

use tailspin_api::{create_router, init_tracing, ApiConfig, ApiError, ApiResult, AppState};
use tailspin_core::TailspinConfig;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let api_config = ApiConfig::from_env()?;
    init_tracing(api_config.log_format)?;

    let config = TailspinConfig::from_env();
    config.validate()?;

    let state = AppState::build(&config, &api_config)?;
    let app = create_router(state, &api_config);

    let addr = api_config.bind_addr;
    tracing::info!(%addr, "Starting Tailspin API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}
