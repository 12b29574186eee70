//! Application state for the API server

use crate::{Config, Hub, Orchestrator};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap handle and Arc clones).
#[derive(Clone)]
pub struct AppState {
    /// Hub that remote subscribers attach to
    pub hub: Hub,

    /// Orchestrator for `POST /batches`; `None` disables batch submission
    pub orchestrator: Option<Arc<Orchestrator>>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(hub: Hub, orchestrator: Option<Arc<Orchestrator>>, config: Arc<Config>) -> Self {
        Self {
            hub,
            orchestrator,
            config,
        }
    }
}
