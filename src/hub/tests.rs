use super::*;
use crate::types::{ProgressStatus, TaskId};
use std::time::Duration;

fn progress(id: &str, percent: f64) -> Event {
    Event::progress(id, percent, ProgressStatus::Downloading)
}

async fn recv(subscription: &mut Subscription) -> Arc<Event> {
    tokio::time::timeout(Duration::from_secs(1), subscription.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("outbound queue closed unexpectedly")
}

#[tokio::test]
async fn publish_reaches_every_registered_subscriber() {
    let hub = Hub::spawn(&HubConfig::default());
    let mut first = hub.subscribe().await.unwrap();
    let mut second = hub.subscribe().await.unwrap();

    let event = Event::progress("1", 50.0, ProgressStatus::Downloading);
    hub.publish(event.clone());

    assert_eq!(*recv(&mut first).await, event);
    assert_eq!(*recv(&mut second).await, event);
}

#[tokio::test]
async fn late_subscriber_gets_no_replay() {
    let hub = Hub::spawn(&HubConfig::default());
    let mut early = hub.subscribe().await.unwrap();
    let mut other = hub.subscribe().await.unwrap();

    hub.publish(progress("1", 50.0));
    let mut late = hub.subscribe().await.unwrap();
    hub.publish(progress("marker", 0.0));

    assert_eq!(recv(&mut early).await.task_id(), Some(&TaskId::from("1")));
    assert_eq!(recv(&mut other).await.task_id(), Some(&TaskId::from("1")));
    assert_eq!(
        recv(&mut late).await.task_id(),
        Some(&TaskId::from("marker")),
        "a subscriber registered after a publish must not see that event"
    );
}

#[tokio::test]
async fn per_subscriber_order_matches_publish_order() {
    let hub = Hub::spawn(&HubConfig::default());
    let mut subscription = hub.subscribe().await.unwrap();

    for i in 0..20 {
        hub.publish(progress("ordered", i as f64));
    }

    for i in 0..20 {
        let event = recv(&mut subscription).await;
        match event.as_ref() {
            Event::Progress(p) => assert_eq!(p.percent, i as f64),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn slow_subscriber_is_disconnected_and_isolated() {
    let config = HubConfig {
        subscriber_buffer: 1,
        ..HubConfig::default()
    };
    let hub = Hub::spawn(&config);
    let mut healthy = hub.subscribe().await.unwrap();
    let mut slow = hub.subscribe().await.unwrap();

    // `slow` never reads: the second publish finds its queue full
    hub.publish(progress("a", 1.0));
    recv(&mut healthy).await;
    hub.publish(progress("a", 2.0));
    recv(&mut healthy).await;
    hub.publish(progress("a", 3.0));
    recv(&mut healthy).await;

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.subscribers, 1, "slow subscriber must be removed");
    assert_eq!(stats.disconnected, 1);
    assert!(slow.closed.is_cancelled(), "transport must be force-closed");

    // Only the event buffered before the overflow is left, then the queue is closed
    assert!(slow.events.recv().await.is_some());
    assert!(
        slow.events.recv().await.is_none(),
        "no dispatch may reach a removed subscriber"
    );
}

#[tokio::test]
async fn dropped_receiver_is_pruned_on_next_dispatch() {
    let hub = Hub::spawn(&HubConfig::default());
    let subscription = hub.subscribe().await.unwrap();
    drop(subscription);

    hub.publish(progress("gone", 1.0));

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.subscribers, 0);
    assert_eq!(stats.disconnected, 1);
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let hub = Hub::spawn(&HubConfig::default());
    let mut subscription = hub.subscribe().await.unwrap();
    let _other = hub.subscribe().await.unwrap();

    hub.unregister(subscription.id).await;
    hub.unregister(subscription.id).await;
    hub.unregister(SubscriberId(9_999)).await;

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.subscribers, 1);
    assert_eq!(
        stats.disconnected, 0,
        "voluntary unregistration is not a delivery failure"
    );
    assert!(subscription.closed.is_cancelled());
    assert!(subscription.events.recv().await.is_none());
}

#[tokio::test]
async fn unregistered_subscriber_receives_nothing_further() {
    let hub = Hub::spawn(&HubConfig::default());
    let mut leaving = hub.subscribe().await.unwrap();
    let mut staying = hub.subscribe().await.unwrap();

    hub.unregister(leaving.id).await;
    hub.publish(progress("after", 1.0));

    recv(&mut staying).await;
    assert!(leaving.events.recv().await.is_none());
}

#[tokio::test]
async fn publish_on_full_queue_drops_without_blocking() {
    let config = HubConfig {
        queue_capacity: 1,
        ..HubConfig::default()
    };
    let hub = Hub::spawn(&config);

    // Current-thread runtime: the hub loop cannot run until this task yields,
    // so only the first publish fits in the queue
    for i in 0..5 {
        hub.publish(progress("burst", i as f64));
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.dropped, 4);
    assert_eq!(stats.published, 1);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let hub = Hub::spawn(&HubConfig::default());
    let (first, _first_sub) = subscriber::channel(SubscriberId(7), 4);
    let (second, second_sub) = subscriber::channel(SubscriberId(7), 4);

    hub.register(first).await.unwrap();
    hub.register(second).await.unwrap();

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.subscribers, 1);
    assert!(second_sub.closed.is_cancelled());
}

#[tokio::test]
async fn publish_with_no_subscribers_is_counted() {
    let hub = Hub::spawn(&HubConfig::default());

    hub.publish(Event::Other {
        kind: "custom".into(),
        payload: serde_json::json!({"k": 1}),
    });

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.published, 1);
    assert_eq!(stats.subscribers, 0);
}
