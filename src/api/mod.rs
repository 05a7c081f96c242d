// src/api/mod.rs

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub mod auth;
pub mod routes;

use crate::error::GatewayError;
use crate::storage::{GatewayHealth, ProcedureGateway};

/// State shared by every request: the process-wide procedure gateway
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn ProcedureGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn ProcedureGateway>) -> Self {
        Self { gateway }
    }
}

/// Create the complete API router.
///
/// Every route in [`routes::ROUTES`] sits behind the API key check;
/// `/health` and the 404 fallback do not.
pub fn create_api_router(gateway: Arc<dyn ProcedureGateway>) -> Router {
    let state = AppState::new(gateway);

    Router::new()
        .merge(routes::create_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let health = state.gateway.health_check().await.unwrap_or_else(|e| {
        GatewayHealth::unhealthy("unknown", e.to_string())
    });

    let status = if health.healthy {
        StatusCode::OK
    } else {
        warn!(
            "Health check failed: {}",
            health.error.as_deref().unwrap_or("unknown error")
        );
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if health.healthy { "healthy" } else { "unhealthy" },
            "service": "pig-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "database": {
                "backend": health.backend_type,
                "healthy": health.healthy,
                "latency_ms": health.latency_ms,
            },
            "timestamp": health.last_check.to_rfc3339()
        })),
    )
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
