use super::*;
use crate::error::{FailureKind, TaskError};
use crate::orchestrator::{FnWorkUnit, Orchestrator, ProgressSink};
use crate::types::{ProgressStatus, Task};
use crate::{Config, Hub};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

mod system;

/// Work unit that fails tasks whose id starts with "fail"
fn scripted_orchestrator(hub: &Hub) -> Arc<Orchestrator> {
    let work = FnWorkUnit::new(
        |task: Task, progress: ProgressSink, _cancel: CancellationToken| async move {
            progress.update(25.0, ProgressStatus::Downloading).await;
            if task.id.as_str().starts_with("fail") {
                Err(TaskError::new(FailureKind::Network, "connection reset"))
            } else {
                Ok(())
            }
        },
    );
    Arc::new(Orchestrator::new(hub.clone(), Arc::new(work)))
}

/// State with a hub and, optionally, an orchestrator
fn test_state(config: Config, with_orchestrator: bool) -> AppState {
    let config = Arc::new(config);
    let hub = Hub::spawn(&config.hub);
    let orchestrator = with_orchestrator.then(|| scripted_orchestrator(&hub));
    AppState::new(hub, orchestrator, config)
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn api_server_binds_and_stops_on_shutdown() {
    let mut config = Config::default();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let state = test_state(config, false);
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(start_api_server(state, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server must stop after shutdown is requested")
        .unwrap();
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let app = create_router(test_state(Config::default(), false));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("Origin", "http://dashboard.local")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn cors_restricted_to_configured_origins() {
    let mut config = Config::default();
    config.server.api.cors_origins = vec!["http://dashboard.local".into()];
    let app = create_router(test_state(config, false));

    let allowed = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("Origin", "http://dashboard.local")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(allowed).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://dashboard.local")
    );

    let other = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("Origin", "http://elsewhere.local")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(other).await.unwrap();
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn cors_disabled_sends_no_headers() {
    let mut config = Config::default();
    config.server.api.cors_enabled = false;
    let app = create_router(test_state(config, false));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://dashboard.local")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn api_key_guards_every_route() {
    let mut config = Config::default();
    config.server.api.api_key = Some("s3cret".into());
    let app = create_router(test_state(config, true));

    for uri in ["/health", "/events", "/ws", "/openapi.json"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let request = Request::builder()
        .uri("/health")
        .header("X-Api-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn swagger_ui_can_be_disabled() {
    let mut config = Config::default();
    config.server.api.swagger_ui = false;
    let app = create_router(test_state(config, false));

    let request = Request::builder()
        .uri("/swagger-ui/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
