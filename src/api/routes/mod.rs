//! Route handlers for the API
//!
//! Handlers are organized by domain:
//! - [`subscribers`] - WebSocket and server-sent event subscribers
//! - [`batches`] - Batch submission
//! - [`system`] - Health and OpenAPI

use serde::{Deserialize, Serialize};

use crate::hub::HubStats;
use crate::types::Task;

mod batches;
mod subscribers;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use batches::*;
pub use subscribers::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /batches
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct BatchRequest {
    /// Tasks to run; must not be empty
    pub tasks: Vec<Task>,
    /// Maximum tasks executing at once (default: `orchestrator.default_concurrency`)
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Response for GET /health
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// "ok" while the hub is running, "degraded" otherwise
    pub status: String,
    /// Crate version
    pub version: String,
    /// Currently connected subscribers
    pub subscribers: usize,
    /// Full hub counters, absent when the hub is not running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubStats>,
}
