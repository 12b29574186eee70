//! Subscriber handlers: WebSocket and server-sent events.
//!
//! Both attach a fresh hub subscription per client. A client that stops
//! reading is disconnected by the hub once its buffer fills, so one slow
//! browser tab cannot stall the others.

use crate::api::AppState;
use crate::error::Error;
use crate::hub::connection::serve_websocket;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::{
        Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// GET /ws - WebSocket subscriber
///
/// Every event published after the upgrade completes is sent as one JSON
/// text frame `{"type": ..., "payload": ...}`. Inbound frames other than
/// close are ignored.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "subscribers",
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Request was not a WebSocket upgrade")
    )
)]
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = serve_websocket(hub, socket).await {
            tracing::warn!(error = %e, "WebSocket subscriber could not be served");
        }
    })
}

/// GET /events - Server-sent events stream
///
/// Same events as `/ws`; the SSE event name is the envelope `type`.
#[utoipa::path(
    get,
    path = "/events",
    tag = "subscribers",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 503, description = "Hub is not running", body = crate::error::ApiError)
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, Error> {
    let subscription = state.hub.subscribe().await?;
    tracing::info!(subscriber_id = %subscription.id, "SSE subscriber connected");

    // Dropping the stream drops the receiver; the hub prunes it on the next publish
    let stream = ReceiverStream::new(subscription.events).filter_map(|event| {
        match serde_json::to_string(event.as_ref()) {
            Ok(json_data) => Some(Ok(SseEvent::default().event(event.kind()).data(json_data))),
            Err(e) => {
                tracing::warn!(error = %e, event_type = event.kind(), "Failed to serialize event");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
