//! Event collection helpers for integration tests

use std::collections::HashSet;
use std::time::Duration;

use dlhub::{Event, ProgressStatus, Subscription, TaskId};

/// Result of waiting on a subscription
#[derive(Debug)]
pub enum WaitResult {
    /// Every expected task reached a terminal state
    Completed(Vec<Event>),
    /// Timed out; holds what arrived so far
    Timeout(Vec<Event>),
    /// The hub closed the subscription
    ChannelClosed(Vec<Event>),
}

impl WaitResult {
    /// Events collected, whatever the outcome
    pub fn events(&self) -> &[Event] {
        match self {
            WaitResult::Completed(events)
            | WaitResult::Timeout(events)
            | WaitResult::ChannelClosed(events) => events,
        }
    }
}

/// Whether `event` ends its task's event sequence
pub fn is_terminal(event: &Event) -> bool {
    match event {
        Event::Progress(p) => p.status.is_terminal(),
        Event::Error(_) => true,
        Event::Other { .. } => false,
    }
}

/// Collect events until every id in `ids` has produced a terminal event
pub async fn collect_until_done(
    subscription: &mut Subscription,
    ids: &[&str],
    timeout: Duration,
) -> WaitResult {
    let mut pending: HashSet<TaskId> = ids.iter().map(|id| TaskId::from(*id)).collect();
    let mut events = Vec::new();

    let finished = tokio::time::timeout(timeout, async {
        while !pending.is_empty() {
            let Some(event) = subscription.events.recv().await else {
                return false;
            };
            if is_terminal(&event)
                && let Some(id) = event.task_id()
            {
                pending.remove(id);
            }
            events.push(event.as_ref().clone());
        }
        true
    })
    .await;

    match finished {
        Ok(true) => WaitResult::Completed(events),
        Ok(false) => WaitResult::ChannelClosed(events),
        Err(_) => WaitResult::Timeout(events),
    }
}

/// Progress percentages reported for `id`, in arrival order
pub fn percents_for(events: &[Event], id: &str) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress(p) if p.id.as_str() == id => Some(p.percent),
            _ => None,
        })
        .collect()
}

/// Statuses reported for `id`, in arrival order
pub fn statuses_for(events: &[Event], id: &str) -> Vec<ProgressStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress(p) if p.id.as_str() == id => Some(p.status),
            _ => None,
        })
        .collect()
}
