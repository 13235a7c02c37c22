use std::sync::Arc;

use axum::extract::Path;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use http::StatusCode;
use rsg_engine::{
    Engine, HealthSnapshot, RunnerStatus, ScenarioDefinition, ValidationError,
    ValidationRequest, ValidationResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::GatewayError;

pub async fn get_health(
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Json<HealthSnapshot>, GatewayError> {
    let snapshot = engine
        .aggregator
        .latest()
        .ok_or(GatewayError::NoHealthData)?;
    Ok(Json(snapshot.as_ref().clone()))
}

pub async fn list_scenarios(
    Extension(engine): Extension<Arc<Engine>>,
) -> Json<Vec<ScenarioDefinition>> {
    Json(engine.catalog.list().to_vec())
}

pub async fn get_scenario(
    Path(id): Path<String>,
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Json<ScenarioDefinition>, GatewayError> {
    Ok(Json(engine.catalog.get(&id)?.clone()))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RunTicket {
    pub run_id: u64,
    pub scenario_id: String,
}

pub async fn start_scenario(
    Path(id): Path<String>,
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Response, GatewayError> {
    let handle = engine.runner.start(&id).await?;
    info!(run_id = handle.run_id, "run accepted for {}", id);
    let ticket = RunTicket {
        run_id: handle.run_id,
        scenario_id: handle.scenario_id.clone(),
    };
    // The run owns its task; dropping the handle only detaches it.
    Ok((StatusCode::ACCEPTED, Json(ticket)).into_response())
}

pub async fn current_run(
    Extension(engine): Extension<Arc<Engine>>,
) -> Json<RunnerStatus> {
    Json(engine.runner.status().await)
}

pub async fn cancel_run(
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Response, GatewayError> {
    let run_id = engine.runner.cancel().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "run_id": run_id })),
    )
        .into_response())
}

/// Wire form of a validation request; `document` may be given as JSON
/// text or inline.
#[derive(Deserialize, Debug)]
pub struct ValidateBody {
    pub collection: String,
    pub document: Value,
    #[serde(alias = "write_concern")]
    pub durability: String,
}

impl From<ValidateBody> for ValidationRequest {
    fn from(body: ValidateBody) -> Self {
        let document = match body.document {
            Value::String(text) => text,
            other => other.to_string(),
        };
        ValidationRequest {
            collection: body.collection,
            document,
            durability: body.durability,
        }
    }
}

pub async fn validate(
    Extension(engine): Extension<Arc<Engine>>,
    body: Result<Json<ValidateBody>, JsonRejection>,
) -> Result<Json<ValidationResult>, GatewayError> {
    // Unreadable bodies get the same 400 as any other malformed input.
    let Json(body) =
        body.map_err(|e| ValidationError::InvalidInput(e.body_text()))?;
    let request = ValidationRequest::from(body);
    Ok(Json(engine.advisor.validate(&request).await?))
}

pub async fn history(
    Path(kind): Path<String>,
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Response, GatewayError> {
    let ledgers = &engine.ledgers;
    let resp = match kind.as_str() {
        "scenarios" => Json(ledgers.scenarios.recent().await).into_response(),
        "validations" => Json(ledgers.validations.recent().await).into_response(),
        "checks" => Json(ledgers.checks.recent().await).into_response(),
        _ => return Err(GatewayError::UnknownHistory(kind)),
    };
    Ok(resp)
}
