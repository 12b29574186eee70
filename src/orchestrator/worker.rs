//! Worker loop: pulls tasks from the shared queue and executes them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::severity::Classifier;
use super::work_unit::{ProgressSink, WorkUnit};
use crate::aggregator::AggregatorHandle;
use crate::error::TaskError;
use crate::hub::Hub;
use crate::types::{Event, ProgressStatus, Task, TaskResult};

/// Everything one worker needs, cloned per worker
pub(super) struct WorkerContext {
    pub index: usize,
    pub tasks: Arc<Mutex<mpsc::Receiver<Task>>>,
    pub results: mpsc::Sender<TaskResult>,
    pub work: Arc<dyn WorkUnit>,
    pub classifier: Arc<dyn Classifier>,
    pub hub: Hub,
    /// Present only when the batch shares an aggregator
    pub aggregator: Option<AggregatorHandle>,
    pub cancel: CancellationToken,
}

/// Run until the task queue is drained or cancellation is observed
///
/// Cancellation is checked only while waiting for the next task and while
/// submitting a result.
pub(super) async fn run_worker(ctx: WorkerContext) {
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = next_task(&ctx.tasks) => next,
        };

        let Some(task) = next else {
            // Queue closed and empty
            break;
        };

        let result = execute(&ctx, &task).await;

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(worker = ctx.index, task_id = %task.id, "Cancelled before result submission");
                break;
            }
            sent = ctx.results.send(result) => {
                if sent.is_err() {
                    // Collector is gone
                    break;
                }
            }
        }
    }

    tracing::debug!(worker = ctx.index, "Worker exiting");
}

async fn next_task(tasks: &Mutex<mpsc::Receiver<Task>>) -> Option<Task> {
    let mut rx = tasks.lock().await;
    rx.recv().await
}

async fn execute(ctx: &WorkerContext, task: &Task) -> TaskResult {
    let sink = match &ctx.aggregator {
        Some(handle) => ProgressSink::aggregated(task.id.clone(), handle.clone()),
        None => ProgressSink::direct(task.id.clone(), ctx.hub.clone()),
    };

    tracing::debug!(worker = ctx.index, task_id = %task.id, "Dispatching task");

    let outcome = AssertUnwindSafe(ctx.work.execute(task, sink.clone(), ctx.cancel.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(TaskError::failed("work unit panicked")));

    match outcome {
        Ok(()) => {
            sink.update(100.0, ProgressStatus::Finished).await;
            tracing::info!(worker = ctx.index, task_id = %task.id, "Task succeeded");
            TaskResult::success(task.id.clone())
        }
        Err(error) => {
            let result = TaskResult::failure(
                task.id.clone(),
                error.clone(),
                ctx.classifier.severity(&error),
            );
            sink.report(Event::error(
                task.id.clone(),
                error.to_string(),
                result.severity,
            ))
            .await;
            tracing::warn!(
                worker = ctx.index,
                task_id = %task.id,
                severity = result.severity,
                error = %error,
                "Task failed"
            );
            result
        }
    }
}
