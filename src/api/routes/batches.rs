//! Batch submission handler.

use super::BatchRequest;
use crate::api::AppState;
use crate::error::Error;
use crate::types::BatchOutcome;
use axum::{Json, extract::State};
use tokio_util::sync::CancellationToken;

/// POST /batches - Run a batch and wait for its outcome
///
/// Progress is broadcast to subscribers while the batch runs. If the client
/// disconnects before the batch finishes, the batch is cancelled.
#[utoipa::path(
    post,
    path = "/batches",
    tag = "batches",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch finished; exit_code is 0 only if every task succeeded", body = BatchOutcome),
        (status = 400, description = "Batch contains no tasks", body = crate::error::ApiError),
        (status = 501, description = "No work unit configured", body = crate::error::ApiError)
    )
)]
pub async fn run_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchOutcome>, Error> {
    let Some(orchestrator) = state.orchestrator.clone() else {
        return Err(Error::NotSupported(
            "no work unit configured for batch execution".to_string(),
        ));
    };

    if request.tasks.is_empty() {
        return Err(Error::InvalidRequest("batch contains no tasks".to_string()));
    }

    let concurrency = request
        .concurrency
        .unwrap_or(state.config.orchestrator.default_concurrency);

    let cancel = CancellationToken::new();
    // Cancels the batch if this handler future is dropped mid-run
    let _cancel_on_drop = cancel.clone().drop_guard();

    let outcome = orchestrator.run(request.tasks, concurrency, cancel).await;
    Ok(Json(outcome))
}
