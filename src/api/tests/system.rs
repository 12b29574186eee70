use super::*;

#[tokio::test]
async fn health_reports_version_and_subscriber_count() {
    let state = test_state(Config::default(), false);
    let _first = state.hub.subscribe().await.unwrap();
    let _second = state.hub.subscribe().await.unwrap();
    let app = create_router(state);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["subscribers"], 2);
    assert_eq!(json["hub"]["dropped"], 0);
}

#[tokio::test]
async fn openapi_endpoint_serves_document() {
    let app = create_router(test_state(Config::default(), false));

    let request = Request::builder()
        .uri("/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["info"]["title"], "dlhub API");
    assert!(json["paths"]["/batches"]["post"].is_object());
}

#[tokio::test]
async fn every_documented_path_is_routed() {
    use utoipa::OpenApi;
    use utoipa::openapi::PathItemType;

    let app = create_router(test_state(Config::default(), false));
    let spec = crate::api::ApiDoc::openapi();

    for (path, item) in &spec.paths.paths {
        let method = if item.operations.contains_key(&PathItemType::Post) {
            "POST"
        } else {
            "GET"
        };
        let request = Request::builder()
            .method(method)
            .uri(path.as_str())
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_ne!(
            response.status(),
            StatusCode::NOT_FOUND,
            "{method} {path} is documented but not routed"
        );
    }
}

#[tokio::test]
async fn swagger_ui_document_url_is_served() {
    let app = create_router(test_state(Config::default(), false));

    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/health"]["get"].is_object());
}
