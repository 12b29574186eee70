//! Work unit abstraction and the per-task progress sink handed to it.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::aggregator::AggregatorHandle;
use crate::error::TaskError;
use crate::hub::Hub;
use crate::types::{Event, ProgressPayload, ProgressStatus, Task, TaskId};

/// The job body executed for each task
///
/// Implementations perform the actual retrieval. They should watch `cancel`
/// and return early when it fires; the orchestrator only checks it between
/// tasks.
#[async_trait::async_trait]
pub trait WorkUnit: Send + Sync {
    /// Execute one task, reporting progress through `progress`
    async fn execute(
        &self,
        task: &Task,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), TaskError>;
}

/// [`WorkUnit`] backed by an async closure
///
/// ```no_run
/// use dlhub::error::TaskError;
/// use dlhub::orchestrator::{FnWorkUnit, ProgressSink};
/// use dlhub::types::{ProgressStatus, Task};
/// use tokio_util::sync::CancellationToken;
///
/// let unit = FnWorkUnit::new(|task: Task, progress: ProgressSink, _cancel: CancellationToken| async move {
///     progress.update(50.0, ProgressStatus::Downloading).await;
///     tracing::info!(task_id = %task.id, "fetched");
///     Ok::<(), TaskError>(())
/// });
/// ```
pub struct FnWorkUnit<F> {
    func: F,
}

impl<F> FnWorkUnit<F> {
    /// Wrap a closure
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait::async_trait]
impl<F, Fut> WorkUnit for FnWorkUnit<F>
where
    F: Fn(Task, ProgressSink, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn execute(
        &self,
        task: &Task,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), TaskError> {
        (self.func)(task.clone(), progress, cancel).await
    }
}

#[derive(Clone)]
enum Target {
    Hub(Hub),
    Aggregator(AggregatorHandle),
}

/// Progress callback for one task
///
/// Routes to the batch's shared aggregator when one is running, otherwise
/// straight to the hub. Reporting never fails from the caller's side.
#[derive(Clone)]
pub struct ProgressSink {
    task: TaskId,
    target: Target,
}

impl ProgressSink {
    pub(crate) fn direct(task: TaskId, hub: Hub) -> Self {
        Self {
            task,
            target: Target::Hub(hub),
        }
    }

    pub(crate) fn aggregated(task: TaskId, handle: AggregatorHandle) -> Self {
        Self {
            task,
            target: Target::Aggregator(handle),
        }
    }

    /// Task this sink reports for
    pub fn task_id(&self) -> &TaskId {
        &self.task
    }

    /// Report an arbitrary event
    ///
    /// Progress percentages are clamped into [0, 100] before leaving the sink.
    pub async fn report(&self, event: Event) {
        let event = match event {
            Event::Progress(payload) => Event::Progress(payload.normalized()),
            other => other,
        };
        match &self.target {
            Target::Hub(hub) => hub.publish(event),
            Target::Aggregator(handle) => handle.report(event).await,
        }
    }

    /// Report a progress update for this task
    pub async fn update(&self, percent: f64, status: ProgressStatus) {
        self.report(Event::progress(self.task.clone(), percent, status))
            .await;
    }

    /// Report a fully-populated progress payload for this task
    ///
    /// The payload's id is replaced with this sink's task id and its
    /// percentage is clamped.
    pub async fn update_with(&self, mut payload: ProgressPayload) {
        payload.id = self.task.clone();
        self.report(Event::Progress(payload)).await;
    }
}
