//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time with utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the dlhub API
///
/// Served at:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/api-docs/openapi.json` - Same document, as loaded by Swagger UI
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dlhub API",
        version = "0.1.0",
        description = "Batch retrieval with live progress broadcast over WebSocket and server-sent events",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Subscribers
        crate::api::routes::ws_handler,
        crate::api::routes::event_stream,

        // Batches
        crate::api::routes::run_batch,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::Task,
        crate::types::TaskResult,
        crate::types::BatchOutcome,
        crate::types::ProgressStatus,
        crate::types::ProgressPayload,
        crate::types::ErrorPayload,
        crate::types::Envelope,

        // Config types from config.rs
        crate::config::Config,
        crate::config::OrchestratorConfig,
        crate::config::HubConfig,
        crate::config::AggregatorConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // Hub statistics
        crate::hub::HubStats,

        // API request/response types from routes
        crate::api::routes::BatchRequest,
        crate::api::routes::HealthResponse,

        // Error types from error.rs
        crate::error::FailureKind,
        crate::error::TaskError,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "subscribers", description = "Live event streams - WebSocket and server-sent events"),
        (name = "batches", description = "Batch execution - Run tasks with bounded concurrency"),
        (name = "system", description = "System endpoints - Health checks and OpenAPI spec"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the X-Api-Key scheme to the generated document
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
