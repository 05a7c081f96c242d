// src/web/mod.rs

use anyhow::Result;
use axum::{serve, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub mod middleware;

use crate::api;
use crate::config::ServerConfig;
use crate::storage::ProcedureGateway;
use middleware::request_logging;

/// Bind the listener and serve until Ctrl+C or SIGTERM
pub async fn start_server(config: &ServerConfig, gateway: Arc<dyn ProcedureGateway>) -> Result<()> {
    let app = create_app(gateway, Duration::from_secs(config.request_timeout));

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        "Server started successfully - listening on http://{}",
        config.bind_address()
    );
    info!("Available endpoints:");
    for route in api::routes::ROUTES {
        info!(
            "   {:<6} {:<12} -> {}",
            route.method.as_str(),
            route.path,
            route.procedure
        );
    }
    info!("   GET    /health      (unauthenticated)");
    info!("Press Ctrl+C to stop");

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the application with all routes and the middleware stack
pub fn create_app(gateway: Arc<dyn ProcedureGateway>, request_timeout: Duration) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout));

    api::create_api_router(gateway).layer(middleware_stack)
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
