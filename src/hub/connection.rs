//! Subscriber connection: one observer's duplex transport.
//!
//! The transport is split into a sink and a stream, each driven by its own
//! loop:
//! - **outbound** writes queued events as JSON text frames, in arrival order
//! - **inbound** reads only to notice the peer going away
//!
//! The loops share nothing but the transport's close signal. Neither loop
//! closes the outbound queue; only the hub does that, when it removes the
//! subscriber.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Hub, SubscriberId, Subscription};
use crate::error::Result;
use crate::types::Event;

/// Accept a WebSocket as a new hub subscriber and serve it until it closes
pub async fn serve_websocket(hub: Hub, socket: WebSocket) -> Result<()> {
    let subscription = hub.subscribe().await?;
    let (sink, stream) = socket.split();
    serve(hub, subscription, sink, stream).await;
    Ok(())
}

/// Serve an already-registered subscription over a split transport
///
/// Returns once both loops have finished and the transport is released.
pub async fn serve<W, R, E>(hub: Hub, subscription: Subscription, sink: W, stream: R)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    let Subscription { id, events, closed } = subscription;

    tracing::info!(subscriber_id = %id, "Subscriber connected");

    let outbound = tokio::spawn(outbound_loop(
        hub.clone(),
        id,
        events,
        closed.clone(),
        sink,
    ));

    inbound_loop(&hub, id, &closed, stream).await;

    if let Err(e) = outbound.await {
        tracing::error!(subscriber_id = %id, error = %e, "Outbound loop panicked");
    }

    tracing::info!(subscriber_id = %id, "Subscriber connection finished");
}

async fn outbound_loop<W>(
    hub: Hub,
    id: SubscriberId,
    mut events: mpsc::Receiver<Arc<Event>>,
    closed: CancellationToken,
    mut sink: W,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display + Send,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            event = events.recv() => event,
        };

        // Queue closed by the hub
        let Some(event) = event else { break };

        let frame = match serde_json::to_string(event.as_ref()) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(subscriber_id = %id, error = %e, "Failed to serialize event, skipping");
                continue;
            }
        };

        // A peer that stops reading must not pin the transport once the hub drops it
        let written = tokio::select! {
            biased;
            sent = sink.send(Message::Text(frame)) => match sent {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(subscriber_id = %id, error = %e, "Write to subscriber failed");
                    false
                }
            },
            _ = closed.cancelled() => {
                tracing::debug!(subscriber_id = %id, "Force-closed during a blocked write");
                break;
            }
        };

        if !written {
            hub.unregister(id).await;
            break;
        }
    }

    // Flushing can block on the same stalled peer; dropping the sink releases it
    tokio::select! {
        biased;
        result = sink.close() => {
            if let Err(e) = result {
                tracing::debug!(subscriber_id = %id, error = %e, "Transport already closed");
            }
        }
        _ = closed.cancelled() => {
            tracing::debug!(subscriber_id = %id, "Dropping transport without flushing");
        }
    }
}

async fn inbound_loop<R, E>(hub: &Hub, id: SubscriberId, closed: &CancellationToken, mut stream: R)
where
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display + Send,
{
    loop {
        let frame = tokio::select! {
            biased;
            // Hub already removed us
            _ = closed.cancelled() => return,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(subscriber_id = %id, "Peer closed connection");
                break;
            }
            // Any other frame only proves liveness
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(subscriber_id = %id, error = %e, "Read from subscriber failed");
                break;
            }
        }
    }

    hub.unregister(id).await;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::types::ProgressStatus;
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;

    type Inbound = fmpsc::UnboundedSender<std::result::Result<Message, std::io::Error>>;
    type Outbound = fmpsc::UnboundedReceiver<Message>;

    /// Register a subscription and serve it over in-memory channels.
    async fn connect(hub: &Hub) -> (Inbound, Outbound, tokio::task::JoinHandle<()>) {
        let subscription = hub.subscribe().await.unwrap();
        let (out_tx, out_rx) = fmpsc::unbounded::<Message>();
        let (in_tx, in_rx) = fmpsc::unbounded();
        let handle = tokio::spawn(serve(hub.clone(), subscription, out_tx, in_rx));
        (in_tx, out_rx, handle)
    }

    async fn wait_for_subscribers(hub: &Hub, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.stats().await.unwrap().subscribers != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count never reached expected value");
    }

    #[tokio::test]
    async fn events_are_written_as_json_text_in_order() {
        let hub = Hub::spawn(&HubConfig::default());
        let (_in_tx, mut out_rx, _handle) = connect(&hub).await;

        hub.publish(Event::progress("a", 10.0, ProgressStatus::Downloading));
        hub.publish(Event::error("a", "boom", 2));

        let first = tokio::time::timeout(Duration::from_secs(1), out_rx.next())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), out_rx.next())
            .await
            .unwrap()
            .unwrap();

        let (Message::Text(first), Message::Text(second)) = (first, second) else {
            panic!("expected two text frames");
        };
        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(first["type"], "progress");
        assert_eq!(first["payload"]["percent"], 10.0);
        assert_eq!(second["type"], "error");
        assert_eq!(second["payload"]["code"], 2);
    }

    #[tokio::test]
    async fn peer_close_unregisters_and_releases_transport() {
        let hub = Hub::spawn(&HubConfig::default());
        let (in_tx, mut out_rx, handle) = connect(&hub).await;
        wait_for_subscribers(&hub, 1).await;

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("connection must finish after peer close")
            .unwrap();
        assert_eq!(hub.stats().await.unwrap().subscribers, 0);
        assert!(
            out_rx.next().await.is_none(),
            "outbound half must be closed once the connection ends"
        );
    }

    #[tokio::test]
    async fn read_error_unregisters_subscriber() {
        let hub = Hub::spawn(&HubConfig::default());
        let (in_tx, _out_rx, handle) = connect(&hub).await;

        in_tx
            .unbounded_send(Err(std::io::Error::other("reset by peer")))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.stats().await.unwrap().subscribers, 0);
    }

    #[tokio::test]
    async fn non_close_frames_keep_connection_alive() {
        let hub = Hub::spawn(&HubConfig::default());
        let (in_tx, mut out_rx, _handle) = connect(&hub).await;

        in_tx
            .unbounded_send(Ok(Message::Text("hello".into())))
            .unwrap();
        in_tx.unbounded_send(Ok(Message::Ping(vec![1]))).unwrap();
        hub.publish(Event::progress("b", 1.0, ProgressStatus::Queued));

        let frame = tokio::time::timeout(Duration::from_secs(1), out_rx.next())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Message::Text(_))));
        assert_eq!(hub.stats().await.unwrap().subscribers, 1);
    }

    #[tokio::test]
    async fn write_failure_unregisters_subscriber() {
        let hub = Hub::spawn(&HubConfig::default());
        let (_in_tx, out_rx, handle) = connect(&hub).await;
        wait_for_subscribers(&hub, 1).await;

        // Peer stops accepting writes
        drop(out_rx);
        hub.publish(Event::progress("c", 5.0, ProgressStatus::Downloading));

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("connection must end after write failure")
            .unwrap();
        wait_for_subscribers(&hub, 0).await;
    }

    #[tokio::test]
    async fn hub_force_close_ends_both_loops() {
        let hub = Hub::spawn(&HubConfig::default());
        let (_in_tx, _out_rx, handle) = connect(&hub).await;
        wait_for_subscribers(&hub, 1).await;

        // Ids are allocated from 1 and this is the only subscriber
        hub.unregister(SubscriberId(1)).await;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("connection must end when the hub removes it")
            .unwrap();
    }

    #[tokio::test]
    async fn stalled_peer_is_released_when_hub_drops_it() {
        let hub = Hub::spawn(&HubConfig {
            subscriber_buffer: 2,
            ..HubConfig::default()
        });
        let subscription = hub.subscribe().await.unwrap();
        // Accepts one frame, then every further write pends because nobody reads
        let (out_tx, _out_rx) = fmpsc::channel::<Message>(0);
        let (_in_tx, in_rx) = fmpsc::unbounded::<std::result::Result<Message, std::io::Error>>();
        let handle = tokio::spawn(serve(hub.clone(), subscription, out_tx, in_rx));
        wait_for_subscribers(&hub, 1).await;

        for n in 0..20 {
            hub.publish(Event::progress("slow", f64::from(n), ProgressStatus::Downloading));
        }

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("connection must finish after the hub disconnects a stalled peer")
            .unwrap();
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.disconnected, 1);
    }
}
