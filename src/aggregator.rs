//! Progress aggregator: one forwarding stream for many concurrent tasks.
//!
//! Workers report through cloned [`AggregatorHandle`]s into a single buffered
//! channel; one background task forwards each event to the [`Hub`] and keeps
//! the latest progress snapshot per task. Events from different tasks
//! interleave in arrival order; events from one task keep their order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AggregatorConfig;
use crate::hub::Hub;
use crate::types::{Event, ProgressPayload, TaskId};

/// Latest known progress for each task
pub type ProgressSnapshot = HashMap<TaskId, ProgressPayload>;

/// Shared progress consumer, owned by one batch run
pub struct ProgressAggregator {
    handle: AggregatorHandle,
    stop: CancellationToken,
    task: tokio::task::JoinHandle<ProgressSnapshot>,
}

/// Reporting side of the aggregator (cheap to clone)
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<Event>,
    stopped: Arc<AtomicBool>,
}

impl AggregatorHandle {
    /// Queue an event for forwarding
    ///
    /// A report after [`ProgressAggregator::stop`] is a caller defect: it is
    /// logged and ignored.
    pub async fn report(&self, event: Event) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!(
                event_type = event.kind(),
                "Progress reported after aggregator stopped, ignoring"
            );
            return;
        }

        if self.tx.send(event).await.is_err() {
            tracing::debug!("Aggregator no longer accepting events");
        }
    }
}

impl ProgressAggregator {
    /// Start the forwarding task
    ///
    /// `cancel` ends forwarding early; buffered events are still flushed to
    /// the hub before the task exits.
    pub fn start(hub: Hub, config: &AggregatorConfig, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let stop = CancellationToken::new();

        let task = tokio::spawn(forward(hub, rx, stop.clone(), cancel));

        Self {
            handle: AggregatorHandle {
                tx,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            stop,
            task,
        }
    }

    /// A handle for reporting progress
    pub fn reporter(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    /// Stop accepting reports, flush everything buffered, and return the final snapshot
    pub async fn stop(self) -> ProgressSnapshot {
        self.handle.stopped.store(true, Ordering::Release);
        self.stop.cancel();

        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Progress aggregator task failed");
                ProgressSnapshot::new()
            }
        }
    }
}

async fn forward(
    hub: Hub,
    mut rx: mpsc::Receiver<Event>,
    stop: CancellationToken,
    cancel: CancellationToken,
) -> ProgressSnapshot {
    let mut snapshot = ProgressSnapshot::new();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => relay(&hub, &mut snapshot, event),
                None => break,
            },
            _ = stop.cancelled() => break,
            _ = cancel.cancelled() => break,
        }
    }

    // Refuse new events, then flush what is already buffered
    rx.close();
    while let Some(event) = rx.recv().await {
        relay(&hub, &mut snapshot, event);
    }

    tracing::debug!(tasks = snapshot.len(), "Progress aggregator drained");
    snapshot
}

fn relay(hub: &Hub, snapshot: &mut ProgressSnapshot, event: Event) {
    if let Event::Progress(progress) = &event {
        snapshot.insert(progress.id.clone(), progress.clone());
    }
    hub.publish(event);
}
