use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use scanflow_activity::ScanResult;
use scanflow_orchestrator::{
  OrchestratorHandle, ScanPayload, StepRecord, WorkflowState, WorkflowStatus,
};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

/// Status document returned by `GET /status`.
///
/// Mirrors the checkpointed [`WorkflowState`], with the scan report read
/// back from the store into `result`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
  pub instance_id: String,
  pub workflow_name: String,
  pub status: WorkflowStatus,
  pub input: ScanPayload,
  pub history: Vec<StepRecord>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<ScanResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// True once the instance is Completed, Failed or Terminated.
  pub done: bool,
}

impl StatusResponse {
  pub fn new(state: WorkflowState, result: Option<ScanResult>) -> Self {
    Self {
      done: state.is_done(),
      instance_id: state.instance_id,
      workflow_name: state.workflow_name,
      status: state.status,
      input: state.input,
      history: state.history,
      result,
      error: state.error,
      created_at: state.created_at,
      updated_at: state.updated_at,
    }
  }
}

pub fn router(handle: OrchestratorHandle) -> Router {
  Router::new()
    .route("/run", post(run))
    .route("/status", get(status))
    .route("/kill", post(kill))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(handle)
}

async fn run(State(handle): State<OrchestratorHandle>, body: String) -> Result<Json<String>, ApiError> {
  let payload = parse_payload(&body)?;
  let instance_id = handle.start(payload).await?;
  info!(instance_id = %instance_id, "workflow scheduled");
  Ok(Json(instance_id))
}

async fn status(
  State(handle): State<OrchestratorHandle>,
  body: String,
) -> Result<Json<StatusResponse>, ApiError> {
  let instance_id = parse_instance_id(&body)?;
  let state = handle.status(instance_id).await?;
  let result = handle.result(&state).await?;
  Ok(Json(StatusResponse::new(state, result)))
}

async fn kill(State(handle): State<OrchestratorHandle>, body: String) -> Result<&'static str, ApiError> {
  let instance_id = parse_instance_id(&body)?;
  handle.terminate(instance_id).await?;
  Ok("Workflow terminated")
}

async fn health() -> Json<Value> {
  Json(json!({ "status": "ok" }))
}

/// A JSON object is a full [`ScanPayload`]; anything else is the target.
fn parse_payload(body: &str) -> Result<ScanPayload, ApiError> {
  let body = body.trim();
  if body.is_empty() {
    return Err(ApiError::invalid_input("request body must contain a scan target"));
  }

  if body.starts_with('{') {
    serde_json::from_str(body)
      .map_err(|e| ApiError::invalid_input(format!("invalid scan payload: {e}")))
  } else {
    Ok(ScanPayload::new(body))
  }
}

fn parse_instance_id(body: &str) -> Result<&str, ApiError> {
  let instance_id = body.trim();
  if instance_id.is_empty() {
    return Err(ApiError::invalid_input("request body must contain an instance id"));
  }
  Ok(instance_id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_raw_target() {
    let payload = parse_payload("  nginx:latest\n").unwrap();
    assert_eq!(payload, ScanPayload::new("nginx:latest"));
  }

  #[test]
  fn test_parse_json_payload() {
    let payload =
      parse_payload(r#"{"target":"nginx:latest","order":{"item_name":"widget","quantity":2}}"#)
        .unwrap();
    assert_eq!(payload, ScanPayload::new("nginx:latest").with_order("widget", 2));
  }

  #[test]
  fn test_parse_empty_body() {
    assert!(matches!(
      parse_payload("   "),
      Err(ApiError::InvalidInput { .. })
    ));
    assert!(matches!(
      parse_instance_id(""),
      Err(ApiError::InvalidInput { .. })
    ));
  }

  #[test]
  fn test_status_document_before_completion() {
    let state = WorkflowState::new("abc", "ContainerScanWorkflow", ScanPayload::new("nginx"));
    let document = serde_json::to_value(StatusResponse::new(state, None)).unwrap();

    assert_eq!(document["instance_id"], "abc");
    assert_eq!(document["status"], "Pending");
    assert_eq!(document["done"], false);
    assert!(document.get("result").is_none());
    assert!(document.get("error").is_none());
  }

  #[test]
  fn test_parse_malformed_json() {
    let err = parse_payload("{\"target\":").unwrap_err();
    assert!(err.to_string().starts_with("invalid scan payload"));
  }
}
