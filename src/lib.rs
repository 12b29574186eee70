//! # dlhub
//!
//! Batch retrieval orchestrator with live progress broadcasting.
//!
//! ## Overview
//!
//! - **Orchestrator** - Runs a batch of tasks through a caller-supplied
//!   [`WorkUnit`] with bounded concurrency and folds the results into one
//!   exit code
//! - **Hub** - Single-task broadcast actor; every registered subscriber
//!   receives every event published after its registration, in order
//! - **Aggregator** - Funnels progress from parallel workers into the hub
//!   through one ordered channel
//! - **API** - Optional axum server exposing the hub over WebSocket and SSE
//!   and accepting batches over HTTP
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dlhub::{Config, FnWorkUnit, Hub, Orchestrator, ProgressSink, Task, cancel_on_signal};
//! use dlhub::error::TaskError;
//! use dlhub::types::ProgressStatus;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let hub = Hub::spawn(&config.hub);
//!     let work = FnWorkUnit::new(|task: Task, progress: ProgressSink, _cancel: CancellationToken| async move {
//!         progress.update(50.0, ProgressStatus::Downloading).await;
//!         tracing::info!(task_id = %task.id, "halfway");
//!         Ok::<(), TaskError>(())
//!     });
//!     let orchestrator = Orchestrator::new(hub.clone(), Arc::new(work));
//!
//!     // Watch events as they happen
//!     let mut subscription = hub.subscribe().await?;
//!     tokio::spawn(async move {
//!         while let Some(event) = subscription.events.recv().await {
//!             println!("{}: {:?}", event.kind(), event.task_id());
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cancel_on_signal(cancel.clone()));
//!
//!     let outcome = orchestrator
//!         .run(vec![Task::new("a"), Task::new("b")], 2, cancel)
//!         .await;
//!     std::process::exit(outcome.exit_code);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Progress aggregation for parallel batches
pub mod aggregator;
/// REST and streaming API
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Broadcast hub and subscriber connections
pub mod hub;
/// Batch orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Core types and events
pub mod types;

use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use aggregator::{AggregatorHandle, ProgressAggregator, ProgressSnapshot};
pub use config::{AggregatorConfig, ApiConfig, Config, HubConfig, OrchestratorConfig};
pub use error::{ApiError, Error, ErrorDetail, FailureKind, Result, TaskError, ToHttpStatus};
pub use hub::subscriber::{SubscriberId, SubscriberState, Subscription};
pub use hub::{Hub, HubStats};
pub use orchestrator::{
    Classifier, DefaultClassifier, EXIT_INTERRUPTED, EXIT_SUCCESS, FnWorkUnit, Orchestrator,
    ProgressSink, WorkUnit,
};
pub use types::{
    BatchOutcome, ErrorPayload, Event, ProgressPayload, ProgressStatus, Task, TaskId, TaskResult,
};

/// Cancel `token` when the process receives a termination signal.
///
/// Returns immediately if the token is cancelled by someone else first.
///
/// - **Unix:** listens for SIGTERM and SIGINT. If neither can be registered
///   (restricted containers) it falls back to `tokio::signal::ctrl_c()`.
/// - **Windows/other:** listens for Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use dlhub::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let cancel = CancellationToken::new();
/// tokio::spawn(cancel_on_signal(cancel.clone()));
/// // hand `cancel` to Orchestrator::run
/// # }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = wait_for_signal() => {}
    }
    tracing::info!("Shutdown requested, cancelling in-flight batch");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "Could not register SIGTERM handler"))
        .ok();
    let sigint = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "Could not register SIGINT handler"))
        .ok();

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    // A missing handler never resolves, leaving the other one to fire
    let term = async {
        match sigterm {
            Some(mut s) => s.recv().await,
            None => std::future::pending().await,
        }
    };
    let int = async {
        match sigint {
            Some(mut s) => s.recv().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = term => tracing::info!("Received SIGTERM signal"),
        _ = int => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
