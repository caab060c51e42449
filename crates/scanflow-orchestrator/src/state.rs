//! Persisted workflow instance state.

use chrono::{DateTime, Utc};
use scanflow_activity::ScanOutcome;
use serde::{Deserialize, Serialize};

/// Lifecycle of a workflow instance.
///
/// `Pending → Running → {Completed, Failed, Terminated}`. `Running` is
/// entered on the first activity dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Terminated,
}

impl WorkflowStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Terminated
    )
  }
}

/// A purchase attached to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub item_name: String,
  pub quantity: u64,
}

/// Input of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
  /// Image reference or path the SBOM is produced for.
  pub target: String,
  #[serde(default = "default_output_format")]
  pub output_format: String,
  /// When present the saga continues into inventory and payment steps.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order: Option<Order>,
}

fn default_output_format() -> String {
  "sarif".to_string()
}

impl ScanPayload {
  pub fn new(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      output_format: default_output_format(),
      order: None,
    }
  }

  pub fn with_order(mut self, item_name: impl Into<String>, quantity: u64) -> Self {
    self.order = Some(Order {
      item_name: item_name.into(),
      quantity,
    });
    self
  }
}

/// Output of one completed activity call, kept for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub activity: String,
  pub output: serde_json::Value,
}

/// Checkpointed state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
  pub instance_id: String,
  pub workflow_name: String,
  pub status: WorkflowStatus,
  pub input: ScanPayload,
  #[serde(default)]
  pub history: Vec<StepRecord>,
  /// Scan outcome; the report bytes stay in the store as chunks.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<ScanOutcome>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
  pub fn new(
    instance_id: impl Into<String>,
    workflow_name: impl Into<String>,
    input: ScanPayload,
  ) -> Self {
    let now = Utc::now();
    Self {
      instance_id: instance_id.into(),
      workflow_name: workflow_name.into(),
      status: WorkflowStatus::Pending,
      input,
      history: Vec::new(),
      result: None,
      error: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_done(&self) -> bool {
    self.status.is_terminal()
  }

  pub(crate) fn transition(&mut self, status: WorkflowStatus) {
    self.status = status;
    self.updated_at = Utc::now();
  }
}
