//! Job orchestrator: bounded worker pool for one batch of tasks.
//!
//! Split into focused submodules:
//! - [`work_unit`] - The caller-supplied job body and its progress sink
//! - [`severity`] - Failure classification and exit-code aggregation
//! - `worker` - The per-worker pull/execute/submit loop
//!
//! # Run sequence
//!
//! 1. Start the progress aggregator (only when `concurrency > 1`)
//! 2. Spawn `concurrency` workers sharing one bounded task queue
//! 3. Feed tasks until the list is exhausted or cancellation fires
//! 4. Collect results until all tasks reported or cancellation fires
//! 5. Wait for every worker to exit (aborting stragglers after the grace period)
//! 6. Stop the aggregator
//!
//! The aggregator is started before the first dispatch and stopped only after
//! the last worker has exited, so no worker can report into a stopped
//! aggregator.

pub mod severity;
pub mod work_unit;
mod worker;


use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::aggregator::ProgressAggregator;
use crate::config::{AggregatorConfig, OrchestratorConfig};
use crate::hub::Hub;
use crate::types::{BatchOutcome, Task, TaskResult};

pub use severity::{
    Classifier, DefaultClassifier, EXIT_INTERRUPTED, EXIT_SUCCESS, aggregate_exit_code,
};
pub use work_unit::{FnWorkUnit, ProgressSink, WorkUnit};

use worker::{WorkerContext, run_worker};

/// Runs batches of tasks against a work unit
///
/// Cheap to share behind an `Arc`; each [`run`](Orchestrator::run) call is
/// independent and owns its own worker pool and aggregator.
pub struct Orchestrator {
    hub: Hub,
    work: Arc<dyn WorkUnit>,
    classifier: Arc<dyn Classifier>,
    config: OrchestratorConfig,
    aggregator_config: AggregatorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with default configuration and classification
    pub fn new(hub: Hub, work: Arc<dyn WorkUnit>) -> Self {
        Self {
            hub,
            work,
            classifier: Arc::new(DefaultClassifier),
            config: OrchestratorConfig::default(),
            aggregator_config: AggregatorConfig::default(),
        }
    }

    /// Replace the worker pool and aggregator settings
    pub fn with_config(
        mut self,
        config: OrchestratorConfig,
        aggregator_config: AggregatorConfig,
    ) -> Self {
        self.config = config;
        self.aggregator_config = aggregator_config;
        self
    }

    /// Replace the failure classifier
    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// The hub this orchestrator publishes to
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Run a batch with the configured default concurrency
    pub async fn run_with_defaults(
        &self,
        tasks: Vec<Task>,
        cancel: CancellationToken,
    ) -> BatchOutcome {
        self.run(tasks, self.config.default_concurrency, cancel)
            .await
    }

    /// Run a batch of tasks with at most `concurrency` executing at once
    ///
    /// `concurrency` below 1 is treated as 1. Without cancellation the
    /// outcome holds exactly one result per task and the exit code is the
    /// worst severity (0 if all succeeded). If `cancel` fires before every
    /// result is in, the outcome holds only the results collected so far and
    /// the exit code is [`EXIT_INTERRUPTED`].
    ///
    /// Results are in completion order, not submission order.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> BatchOutcome {
        let total = tasks.len();
        let concurrency = concurrency.max(1);

        if total == 0 {
            return BatchOutcome {
                results: Vec::new(),
                exit_code: EXIT_SUCCESS,
            };
        }

        tracing::info!(tasks = total, concurrency, "Starting batch");

        // 1. Aggregator strictly before any dispatch
        let aggregator = (concurrency > 1).then(|| {
            ProgressAggregator::start(self.hub.clone(), &self.aggregator_config, cancel.clone())
        });

        // 2. Workers
        let (task_tx, task_rx) = mpsc::channel::<Task>(concurrency);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<TaskResult>(total);

        let mut workers = JoinSet::new();
        for index in 0..concurrency.min(total) {
            workers.spawn(run_worker(WorkerContext {
                index,
                tasks: Arc::clone(&task_rx),
                results: result_tx.clone(),
                work: Arc::clone(&self.work),
                classifier: Arc::clone(&self.classifier),
                hub: self.hub.clone(),
                aggregator: aggregator.as_ref().map(ProgressAggregator::reporter),
                cancel: cancel.clone(),
            }));
        }
        drop(result_tx);

        // 3. Feeder
        let feeder = tokio::spawn(feed(tasks, task_tx, cancel.clone()));

        // 4. Collect
        let mut results = Vec::with_capacity(total);
        let mut interrupted = false;
        while results.len() < total {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                result = result_rx.recv() => match result {
                    Some(result) => results.push(result),
                    // Every worker exited early
                    None => break,
                },
            }
        }

        if let Err(e) = feeder.await {
            tracing::error!(error = %e, "Task feeder failed");
        }

        // 5. Drain workers
        if interrupted {
            let grace = self.config.shutdown_grace;
            if tokio::time::timeout(grace, join_all(&mut workers))
                .await
                .is_err()
            {
                tracing::warn!(
                    grace_secs = grace.as_secs_f64(),
                    "Workers still busy after grace period, abandoning in-flight tasks"
                );
                workers.abort_all();
                join_all(&mut workers).await;
            }
        } else {
            join_all(&mut workers).await;
        }

        // Results submitted before the workers saw cancellation
        while let Ok(result) = result_rx.try_recv() {
            results.push(result);
        }

        // Cancellation that lands after the last result does not truncate the batch
        let interrupted = interrupted && results.len() < total;

        // 6. Aggregator strictly after every worker has exited
        if let Some(aggregator) = aggregator {
            let snapshot = aggregator.stop().await;
            tracing::debug!(tracked_tasks = snapshot.len(), "Aggregator stopped");
        }

        let exit_code = if interrupted {
            EXIT_INTERRUPTED
        } else {
            if results.len() < total {
                tracing::error!(
                    expected = total,
                    collected = results.len(),
                    "Workers exited before reporting every task"
                );
            }
            aggregate_exit_code(&results)
        };

        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(
            tasks = total,
            completed = results.len(),
            failed,
            exit_code,
            interrupted,
            "Batch finished"
        );

        BatchOutcome { results, exit_code }
    }
}

/// Push tasks into the shared queue until done or cancelled
///
/// Dropping the sender on return closes the queue, which lets idle workers exit.
async fn feed(tasks: Vec<Task>, queue: mpsc::Sender<Task>, cancel: CancellationToken) {
    for task in tasks {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cancellation observed, stopping task submission");
                return;
            }
            sent = queue.send(task) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined
            && !e.is_cancelled()
        {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}
