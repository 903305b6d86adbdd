use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gts::{GtsConfig, GtsOps};
use gts_cli::server::GtsHttpServer;
use serde_json::{Value, json};
use tower::ServiceExt;

fn ops() -> Arc<GtsOps> {
    Arc::new(GtsOps::from_documents(
        vec![
            (
                "event.json".to_owned(),
                json!({
                    "$id": "gts.x.core.events.event.v1~",
                    "type": "object",
                    "required": ["status"],
                    "properties": {"status": {"type": "string"}}
                }),
            ),
            (
                "one.json".to_owned(),
                json!({
                    "gtsId": "gts.x.core.events.event.v1~evt.v1.one",
                    "status": "active"
                }),
            ),
        ],
        GtsConfig::default(),
    ))
}

async fn get_json(router: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

#[tokio::test]
async fn test_validate_id_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let (status, body) =
        get_json(router, "/validate-id?gts_id=gts.x.core.events.event.v1~").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], json!(true));
}

#[tokio::test]
async fn test_entities_and_entity_routes() {
    let router = GtsHttpServer::router(ops(), 0);
    let (status, body) = get_json(router, "/entities?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(2));

    let router = GtsHttpServer::router(ops(), 0);
    let (_, body) = get_json(router, "/entities/gts.x.core.events.event.v1~").await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["entity"]["is_schema"], json!(true));
}

#[tokio::test]
async fn test_query_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let (status, body) = get_json(router, "/query?expr=*~*&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(2));
}

#[tokio::test]
async fn test_attr_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let (_, body) = get_json(
        router,
        "/attr?gts_with_path=gts.x.core.events.event.v1~evt.v1.one@status",
    )
    .await;
    assert_eq!(body["resolved"], json!(true));
    assert_eq!(body["value"], json!("active"));
}

#[tokio::test]
async fn test_validate_instance_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/validate-instance")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"instance_id": "gts.x.core.events.event.v1~evt.v1.one"}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(value["ok"], json!(true));
}

#[tokio::test]
async fn test_verbose_router_layers_logging_middleware() {
    let router = GtsHttpServer::router(ops(), 1);
    let (status, body) =
        get_json(router, "/validate-id?gts_id=gts.x.core.events.event.v1~").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], json!(true));
}

#[tokio::test]
async fn test_extract_id_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/extract-id")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"gtsId": "gts.x.core.events.event.v1~evt.v1.one"}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(value["ok"], json!(true));
    assert_eq!(value["schema_id"], json!("gts.x.core.events.event.v1~"));
}

#[tokio::test]
async fn test_diagnostics_route() {
    let router = GtsHttpServer::router(ops(), 0);
    let (status, body) = get_json(router, "/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], json!(2));
}
