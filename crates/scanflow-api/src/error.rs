use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scanflow_orchestrator::WorkflowError;
use serde_json::json;
use tracing::warn;

/// Errors returned by the control API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("{message}")]
  InvalidInput { message: String },

  #[error(transparent)]
  Workflow(#[from] WorkflowError),
}

impl ApiError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let message = self.to_string();
    warn!(error = %message, "request_failed");
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
  }
}
