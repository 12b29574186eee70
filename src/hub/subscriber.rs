//! Subscriber records owned by the hub, and the handle given to the transport side.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::Event;

/// Unique identifier for a subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber lifecycle
///
/// Transitions only move forward, one step at a time:
/// `Connecting → Registered → Active → Unregistering → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubscriberState {
    /// Transport accepted, not yet known to the hub
    Connecting,
    /// Inserted into the hub's subscriber set
    Registered,
    /// Receiving dispatches
    Active,
    /// Being removed; no further dispatches
    Unregistering,
    /// Outbound queue closed and transport released
    Closed,
}

impl SubscriberState {
    /// The only state reachable from this one, if any
    pub fn next(self) -> Option<SubscriberState> {
        match self {
            SubscriberState::Connecting => Some(SubscriberState::Registered),
            SubscriberState::Registered => Some(SubscriberState::Active),
            SubscriberState::Active => Some(SubscriberState::Unregistering),
            SubscriberState::Unregistering => Some(SubscriberState::Closed),
            SubscriberState::Closed => None,
        }
    }
}

/// Hub-side record of one observer
///
/// Holds the sending half of the outbound queue and the transport's close
/// signal. Dropping the record closes the queue, so the queue is closed
/// exactly once: when the hub removes the record.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    outbound: mpsc::Sender<Arc<Event>>,
    close: CancellationToken,
    state: SubscriberState,
}

impl Subscriber {
    /// Subscriber identifier
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriberState {
        self.state
    }

    /// Advance to `next`
    ///
    /// Returns `false` and leaves the state unchanged if `next` is not the
    /// immediate successor of the current state.
    pub fn advance(&mut self, next: SubscriberState) -> bool {
        if self.state.next() == Some(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub(super) fn outbound(&self) -> &mpsc::Sender<Arc<Event>> {
        &self.outbound
    }

    /// Signal the transport to close
    pub(super) fn force_close(&self) {
        self.close.cancel();
    }
}

/// Transport-side half of a subscriber
///
/// The connection reads events from `events` and watches `closed`, which the
/// hub fires when it disconnects the subscriber.
#[derive(Debug)]
pub struct Subscription {
    /// Subscriber identifier (pass to [`Hub::unregister`](super::Hub::unregister))
    pub id: SubscriberId,
    /// Outbound queue, closed by the hub on removal
    pub events: mpsc::Receiver<Arc<Event>>,
    /// Fired when the hub force-closes this subscriber
    pub closed: CancellationToken,
}

/// Create a connected subscriber/subscription pair in the `Connecting` state
///
/// `buffer` is the outbound queue capacity (coerced to at least 1).
pub fn channel(id: SubscriberId, buffer: usize) -> (Subscriber, Subscription) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let close = CancellationToken::new();

    let subscriber = Subscriber {
        id,
        outbound: tx,
        close: close.clone(),
        state: SubscriberState::Connecting,
    };
    let subscription = Subscription {
        id,
        events: rx,
        closed: close,
    };

    (subscriber, subscription)
}
