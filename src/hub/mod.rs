//! Broadcast hub: a single coordination task fanning events out to subscribers.
//!
//! Submodules:
//! - [`subscriber`] - Subscriber records and lifecycle state
//! - [`connection`] - Duplex transport loops for one subscriber
//!
//! Every mutation of the subscriber set goes through one command queue that a
//! single task drains in order. Nothing outside that task can see the set, so
//! there is no lock to take and no way to observe it mid-update.
//!
//! Backpressure is asymmetric:
//! - **Publish side** - if the command queue is full the event is dropped and
//!   logged. Publishers never block and never see an error.
//! - **Subscriber side** - if a subscriber's outbound queue is full (or gone)
//!   the subscriber is disconnected. It does not silently miss updates.

pub mod connection;
pub mod subscriber;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::types::Event;

pub use subscriber::{Subscriber, SubscriberId, SubscriberState, Subscription};

/// Commands processed by the coordination loop
enum Command {
    Register(Subscriber),
    Unregister(SubscriberId),
    Publish(Arc<Event>),
    Stats(oneshot::Sender<HubStats>),
}

/// Why a subscriber left the set
#[derive(Clone, Copy, Debug)]
enum Removal {
    /// Transport side asked to leave
    Requested,
    /// Outbound queue was full
    Unresponsive,
    /// Outbound queue receiver was dropped
    Gone,
    /// Hub loop is ending
    Shutdown,
}

/// Point-in-time hub counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// Events dispatched by the coordination loop
    pub published: u64,
    /// Events dropped because the command queue was full
    pub dropped: u64,
    /// Subscribers removed for failed delivery
    pub disconnected: u64,
}

/// Handle to the broadcast hub (cheap to clone)
///
/// The coordination task runs until every handle has been dropped. There is
/// no shutdown method: individual subscribers leave through
/// [`unregister`](Hub::unregister) or by failing delivery.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    dropped: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    subscriber_buffer: usize,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .field("subscriber_buffer", &self.subscriber_buffer)
            .finish()
    }
}

impl Hub {
    /// Spawn the coordination task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &HubConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_loop(rx, dropped.clone()));

        tracing::debug!(
            queue_capacity = config.queue_capacity,
            subscriber_buffer = config.subscriber_buffer,
            "Broadcast hub started"
        );

        Self {
            commands: tx,
            dropped,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_buffer: config.subscriber_buffer.max(1),
        }
    }

    /// Allocate a fresh subscriber id
    pub fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a subscriber
    ///
    /// Waits for room in the command queue; registration is never dropped.
    /// The subscriber sees only events published after this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the coordination task has stopped.
    pub async fn register(&self, subscriber: Subscriber) -> Result<()> {
        self.commands
            .send(Command::Register(subscriber))
            .await
            .map_err(|_| Error::HubClosed)
    }

    /// Create, register and return a new subscription with the configured buffer
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (subscriber, subscription) =
            subscriber::channel(self.next_subscriber_id(), self.subscriber_buffer);
        self.register(subscriber).await?;
        Ok(subscription)
    }

    /// Unregister a subscriber
    ///
    /// Idempotent: unknown or already-removed ids are ignored, as is a hub
    /// that has already stopped.
    pub async fn unregister(&self, id: SubscriberId) {
        if self.commands.send(Command::Unregister(id)).await.is_err() {
            tracing::debug!(subscriber_id = %id, "Unregister after hub stopped");
        }
    }

    /// Publish an event to every registered subscriber
    ///
    /// Never blocks. If the hub is saturated the event is dropped and the
    /// drop is logged; the caller is not told.
    pub fn publish(&self, event: Event) {
        match self.commands.try_send(Command::Publish(Arc::new(event))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Command::Publish(event))) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    event_type = event.kind(),
                    task_id = event.task_id().map(|id| id.as_str()),
                    dropped_total = dropped,
                    "Hub queue full, dropping event"
                );
            }
            Err(_) => {
                tracing::debug!("Publish after hub stopped, dropping event");
            }
        }
    }

    /// Current counters
    ///
    /// Answered by the coordination loop, so every command sent before this
    /// call has been applied when the result comes back.
    pub async fn stats(&self) -> Result<HubStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(reply_tx))
            .await
            .map_err(|_| Error::HubClosed)?;
        reply_rx.await.map_err(|_| Error::HubClosed)
    }
}

/// State owned exclusively by the coordination task
struct HubLoop {
    subscribers: HashMap<SubscriberId, Subscriber>,
    published: u64,
    disconnected: u64,
}

impl HubLoop {
    fn register(&mut self, mut subscriber: Subscriber) {
        let id = subscriber.id();

        if self.subscribers.contains_key(&id) {
            tracing::warn!(subscriber_id = %id, "Duplicate subscriber id, rejecting registration");
            subscriber.force_close();
            return;
        }

        subscriber.advance(SubscriberState::Registered);
        // No handshake beyond registration
        subscriber.advance(SubscriberState::Active);
        self.subscribers.insert(id, subscriber);

        tracing::info!(
            subscriber_id = %id,
            subscribers = self.subscribers.len(),
            "Subscriber registered"
        );
    }

    /// Remove a subscriber; a no-op if it is not in the set
    fn remove(&mut self, id: SubscriberId, reason: Removal) {
        let Some(mut subscriber) = self.subscribers.remove(&id) else {
            tracing::debug!(subscriber_id = %id, "Unregister for unknown subscriber ignored");
            return;
        };

        subscriber.advance(SubscriberState::Unregistering);
        subscriber.force_close();
        subscriber.advance(SubscriberState::Closed);
        // Dropping the record closes the outbound queue
        drop(subscriber);

        if matches!(reason, Removal::Unresponsive | Removal::Gone) {
            self.disconnected += 1;
        }

        tracing::info!(
            subscriber_id = %id,
            reason = ?reason,
            subscribers = self.subscribers.len(),
            "Subscriber removed"
        );
    }

    fn dispatch(&mut self, event: Arc<Event>) {
        self.published += 1;

        let mut failed = Vec::new();
        for (id, subscriber) in &self.subscribers {
            match subscriber.outbound().try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber_id = %id, "Subscriber outbound queue full, disconnecting");
                    failed.push((*id, Removal::Unresponsive));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    failed.push((*id, Removal::Gone));
                }
            }
        }

        for (id, reason) in failed {
            self.remove(id, reason);
        }
    }

    fn stats(&self, dropped: u64) -> HubStats {
        HubStats {
            subscribers: self.subscribers.len(),
            published: self.published,
            dropped,
            disconnected: self.disconnected,
        }
    }
}

async fn run_loop(mut commands: mpsc::Receiver<Command>, dropped: Arc<AtomicU64>) {
    let mut hub = HubLoop {
        subscribers: HashMap::new(),
        published: 0,
        disconnected: 0,
    };

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register(subscriber) => hub.register(subscriber),
            Command::Unregister(id) => hub.remove(id, Removal::Requested),
            Command::Publish(event) => hub.dispatch(event),
            Command::Stats(reply) => {
                // Requester may have given up waiting
                reply.send(hub.stats(dropped.load(Ordering::Relaxed))).ok();
            }
        }
    }

    let remaining: Vec<_> = hub.subscribers.keys().copied().collect();
    for id in remaining {
        hub.remove(id, Removal::Shutdown);
    }
    tracing::debug!("Broadcast hub stopped");
}
