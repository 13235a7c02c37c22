use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use axum::http::StatusCode;
use rsg_engine::{
    ControlError, HttpNodeControl, HttpStatusSource, Liveness, NodeControl,
    NodeRole, SourceError, SourceKind, SourcePayload, StatusSource,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn cluster_status() -> Json<Value> {
    Json(json!({
        "replica_set": "rs0",
        "members": [
            {"name": "mongo-primary:27017", "state": "PRIMARY", "health": "healthy", "uptime": 300},
            {"name": "mongo-secondary1:27017", "state": "SECONDARY", "health": "healthy", "uptime": 290},
            {"name": "mongo-secondary2:27017", "state": "(not reachable/healthy)", "health": "unhealthy", "uptime": 0}
        ],
        "total_nodes": 3,
        "healthy_nodes": 2
    }))
}

async fn docker_stop(Json(body): Json<Value>) -> Json<Value> {
    if body["node"] == "mongo-ghost" {
        return Json(json!({"success": false, "error": "Container mongo-ghost not found"}));
    }
    assert!(body["duration"].as_u64().is_some());
    Json(json!({"success": true, "message": "stopped"}))
}

async fn serve() -> String {
    let app = Router::new()
        .route("/cluster/status", get(cluster_status))
        .route(
            "/replication/lag",
            get(|| async { Json(json!({"status": "error", "message": "no primary found"})) }),
        )
        .route(
            "/recovery/status",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/docker/stop", post(docker_stop))
        .route(
            "/docker/start",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "docker daemon unreachable") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn status_source_parses_cluster_membership() {
    let base = serve().await;
    let source = HttpStatusSource::new(
        SourceKind::Cluster,
        format!("{base}/cluster/status"),
        Duration::from_secs(2),
    )
    .unwrap();
    assert_eq!(source.name(), "cluster");

    let SourcePayload::Membership(nodes) = source.fetch().await.unwrap() else {
        panic!("expected membership");
    };
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].name, "mongo-primary");
    assert_eq!(nodes[0].role, NodeRole::Primary);
    assert_eq!(nodes[2].liveness, Liveness::Down);
}

#[tokio::test]
async fn status_source_surfaces_failures() {
    let base = serve().await;
    let lag = HttpStatusSource::new(
        SourceKind::Replication,
        format!("{base}/replication/lag"),
        Duration::from_secs(2),
    )
    .unwrap();
    assert!(matches!(
        lag.fetch().await,
        Err(SourceError::Reported(m)) if m == "no primary found"
    ));

    let recovery = HttpStatusSource::new(
        SourceKind::Recovery,
        format!("{base}/recovery/status"),
        Duration::from_secs(2),
    )
    .unwrap()
    .with_name("recovery-service");
    assert_eq!(recovery.name(), "recovery-service");
    assert!(matches!(recovery.fetch().await, Err(SourceError::Status(500))));
}

#[tokio::test]
async fn node_control_reports_rejections_verbatim() {
    let base = serve().await;
    let control = HttpNodeControl::new(base, Duration::from_secs(2)).unwrap();

    control
        .stop("mongo-secondary1", Duration::from_secs(30))
        .await
        .unwrap();
    control
        .isolate("mongo-secondary2", Duration::from_secs(30))
        .await
        .unwrap();

    let err = control
        .stop("mongo-ghost", Duration::from_secs(30))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Container mongo-ghost not found");

    let err = control.start("mongo-secondary1").await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::Status { status: 503, ref message } if message == "docker daemon unreachable"
    ));
}
