use axum::response::IntoResponse;
use http::StatusCode;
use rsg_engine::{CatalogError, RunnerError, ValidationError};

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("no cluster health data yet")]
    NoHealthData,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown history kind: {0}")]
    UnknownHistory(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use GatewayError::*;
        let (code, code_str) = match &self {
            NoHealthData => (StatusCode::SERVICE_UNAVAILABLE, "NO_HEALTH_DATA"),
            Catalog(CatalogError::UnknownScenario(_))
            | Runner(RunnerError::Catalog(CatalogError::UnknownScenario(_))) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_SCENARIO")
            }
            Catalog(_) | Runner(RunnerError::Catalog(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CATALOG_ERROR")
            }
            Runner(RunnerError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, "ALREADY_RUNNING")
            }
            Runner(RunnerError::NotRunning) => (StatusCode::CONFLICT, "NOT_RUNNING"),
            Runner(RunnerError::Completed(_)) => {
                (StatusCode::CONFLICT, "ALREADY_COMPLETED")
            }
            Runner(RunnerError::Aborted(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "RUN_ABORTED")
            }
            Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            UnknownHistory(_) => (StatusCode::NOT_FOUND, "UNKNOWN_HISTORY"),
        };
        let body = serde_json::json!({
            "error": { "code": code_str, "message": self.to_string() }
        });
        let mut resp = (code, body.to_string()).into_response();
        resp.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        resp
    }
}
