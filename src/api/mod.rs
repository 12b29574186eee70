//! REST and streaming API server module
//!
//! Exposes the broadcast hub to remote subscribers (WebSocket and SSE) and
//! accepts batches for the configured orchestrator.

use crate::Result;
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Subscribers
/// - `GET /ws` - WebSocket subscriber (outbound events, inbound close only)
/// - `GET /events` - Server-sent events subscriber
///
/// ## Batches
/// - `POST /batches` - Run a batch and wait for its outcome
///
/// ## System
/// - `GET /health` - Health check with live subscriber count
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /api-docs/openapi.json` - Document loaded by Swagger UI (if enabled)
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let router = Router::new()
        // Subscribers
        .route("/ws", get(routes::ws_handler))
        .route("/events", get(routes::event_stream))
        // Batches
        .route("/batches", post(routes::run_batch))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes before applying state; its document URL must
    // not collide with the /openapi.json route above
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let router = if config.server.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin. Origins that are not valid
/// header values are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    let layer = if allow_any || origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };

    layer.allow_methods(Any).allow_headers(Any)
}

/// Start the API server on the configured bind address.
///
/// Runs until `shutdown` is cancelled or the listener fails. Open WebSocket
/// and SSE subscribers are not waited for; they end when the hub drops them.
///
/// # Example
///
/// ```no_run
/// use dlhub::{Config, Hub};
/// use dlhub::api::AppState;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let hub = Hub::spawn(&config.hub);
/// let state = AppState::new(hub, None, config);
///
/// let shutdown = CancellationToken::new();
/// tokio::spawn(dlhub::cancel_on_signal(shutdown.clone()));
/// dlhub::api::start_api_server(state, shutdown).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let bind_address = state.config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(state);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
