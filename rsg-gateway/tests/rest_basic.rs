use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use envconfig::Envconfig;
use rsg_engine::catalog::{RiskLevel, ScenarioCatalog, ScenarioDefinition, Stage};
use rsg_engine::{
    ControlError, Engine, EngineConfig, Liveness, NodeControl, NodeRecord,
    NodeRole, SourceError, SourceKind, SourcePayload, StatusSource,
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

struct StaticCluster;

#[async_trait::async_trait]
impl StatusSource for StaticCluster {
    fn name(&self) -> &str {
        "cluster"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cluster
    }

    async fn fetch(&self) -> Result<SourcePayload, SourceError> {
        Ok(SourcePayload::Membership(vec![
            NodeRecord::new("node-a", NodeRole::Primary, Liveness::Up),
            NodeRecord::new("node-b", NodeRole::Secondary, Liveness::Up),
            NodeRecord::new("node-c", NodeRole::Secondary, Liveness::Up),
        ]))
    }
}

struct NoopControl;

#[async_trait::async_trait]
impl NodeControl for NoopControl {
    async fn stop(&self, _node: &str, _after: Duration) -> Result<(), ControlError> {
        Ok(())
    }

    async fn start(&self, _node: &str) -> Result<(), ControlError> {
        Ok(())
    }
}

fn engine() -> Arc<Engine> {
    let config = EngineConfig::init_from_hashmap(&HashMap::new()).unwrap();
    let catalog = ScenarioCatalog::new(vec![ScenarioDefinition {
        id: "node-b-fail".to_string(),
        name: "Node B failure".to_string(),
        description: String::new(),
        risk: RiskLevel::Low,
        targets: vec!["node-b".to_string()],
        duration_secs: 60,
        stages: vec![Stage::stop("node-b"), Stage::wait(60)],
    }])
    .unwrap();
    let sources: Vec<Arc<dyn StatusSource>> = vec![Arc::new(StaticCluster)];
    Arc::new(Engine::new(&config, catalog, sources, Arc::new(NoopControl)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_unavailable_until_first_poll() {
    let engine = engine();
    let app = rsg_gateway::build_router(engine.clone());

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NO_HEALTH_DATA");

    engine.aggregator.poll().await;
    let (status, body) = call(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quorum"], "HEALTHY");
    assert_eq!(body["total_nodes"], 3);
}

#[tokio::test]
async fn scenarios_are_listed_and_looked_up() {
    let app = rsg_gateway::build_router(engine());
    let (status, body) = call(&app, "GET", "/api/scenarios", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["stages"][0]["kind"], "stop-node");

    let (status, body) = call(&app, "GET", "/api/scenarios/node-b-fail", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk"], "LOW");

    let (status, body) = call(&app, "GET", "/api/scenarios/bogus", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_SCENARIO");
}

#[tokio::test(start_paused = true)]
async fn run_lifecycle_over_http() {
    let engine = engine();
    let app = rsg_gateway::build_router(engine.clone());

    let (status, ticket) = call(&app, "POST", "/api/scenarios/node-b-fail/start", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ticket["scenario_id"], "node-b-fail");

    let (status, body) = call(&app, "POST", "/api/scenarios/node-b-fail/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_RUNNING");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let (status, body) = call(&app, "GET", "/api/runs/current", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "RUNNING");
    assert_eq!(body["run"]["stage_index"], 1);

    let (status, body) = call(&app, "POST", "/api/runs/current/cancel", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["run_id"], ticket["run_id"]);

    while engine.runner.is_running().await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (status, body) = call(&app, "POST", "/api/runs/current/cancel", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NOT_RUNNING");

    let (_, body) = call(&app, "GET", "/api/runs/current", None).await;
    assert_eq!(body["state"], "IDLE");
    assert_eq!(body["last"]["state"], "FAILED");

    let (status, body) = call(&app, "GET", "/api/history/scenarios", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["outcome"]["status"], "FAILED");
    assert_eq!(body[0]["outcome"]["reason"], "cancelled");
}

#[tokio::test]
async fn validation_rejects_malformed_documents() {
    let engine = engine();
    let app = rsg_gateway::build_router(engine.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/api/validate",
        Some(json!({"collection": "orders", "document": "{oops", "durability": "majority"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, body) = call(
        &app,
        "POST",
        "/api/validate",
        Some(json!({"collection": "orders", "durability": "majority"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("document")
    );

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/validate")
                .body(Body::from("collection=orders"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.headers()["content-type"],
        "application/json"
    );
    assert!(engine.ledgers.validations.is_empty().await);

    engine.aggregator.poll().await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/validate",
        Some(json!({"collection": "orders", "document": {"qty": 2}, "write_concern": "majority"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_safe"], true);
    assert_eq!(body["can_execute"], true);

    let (status, body) = call(
        &app,
        "POST",
        "/api/validate",
        Some(json!({"collection": "orders", "document": "{}", "durability": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_safe"], false);

    let (_, body) = call(&app, "GET", "/api/history/validations", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, _) = call(&app, "GET", "/api/history/weather", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
