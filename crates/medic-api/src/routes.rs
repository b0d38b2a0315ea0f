//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! a request body limit and all endpoint handlers.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use medic_core::{MedicConfig, MedicError};

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Producers are other cluster services, not browsers on a fixed origin.
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/stream", get(handlers::stream))
        .route(
            "/actions",
            post(handlers::submit_action).get(handlers::list_actions),
        )
        .route(
            "/actions/{id}",
            get(handlers::get_action)
                .put(handlers::update_action)
                .delete(handlers::cancel_action),
        )
        .route("/api/v1/actions/{id}/status", get(handlers::action_status))
        .route(
            "/api/v1/incidents",
            get(handlers::list_incidents).post(handlers::create_incident),
        )
        .route(
            "/api/v1/incidents/{id}",
            put(handlers::update_incident).delete(handlers::cancel_incident),
        )
        .route(
            "/api/v1/incidents/{id}/correlate",
            post(handlers::correlate_incident),
        )
        .route("/api/v1/anomalies/analyze", post(handlers::analyze))
        .route(
            "/api/v1/remediation/trigger",
            post(handlers::trigger_remediation),
        )
        .route("/api/v1/cluster/status", get(handlers::cluster_status))
        .route("/api/v1/workflows/queue", get(handlers::workflow_queue))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn start_server<F>(
    config: &MedicConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), MedicError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.general.bind_address, config.general.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MedicError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Starting API server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MedicError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
