use scanflow_activity::{ActivityError, BlobManifest};
use scanflow_blob::BlobError;
use scanflow_host_kv::StoreError;

use crate::state::WorkflowStatus;

/// Errors raised while creating, driving or controlling workflow instances.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  #[error("workflow instance '{instance_id}' not found")]
  NotFound { instance_id: String },

  #[error("workflow instance '{instance_id}' already finished as {status:?}")]
  AlreadyFinished {
    instance_id: String,
    status: WorkflowStatus,
  },

  /// The instance could not be scheduled.
  #[error("failed to create workflow instance: {message}")]
  Creation { message: String },

  /// The orchestrator loop is not running.
  #[error("orchestrator unavailable")]
  Unavailable,

  #[error("activity '{activity}' failed: {source}")]
  Activity {
    activity: String,
    #[source]
    source: ActivityError,
  },

  /// A business rule stopped the saga.
  #[error("{message}")]
  Rejected { message: String },

  #[error("workflow terminated")]
  Terminated,

  /// Replayed history does not match the activity sequence.
  #[error("non-deterministic replay at step {step}: expected '{expected}', recorded '{recorded}'")]
  NonDeterministic {
    step: usize,
    expected: String,
    recorded: String,
  },

  #[error("state store error: {0}")]
  Store(#[from] StoreError),

  /// A stored scan report could not be read back.
  #[error("failed to read scan report: {0}")]
  Report(#[from] BlobError),

  #[error("corrupt checkpoint '{key}': {source}")]
  CorruptCheckpoint {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to render notification: {message}")]
  Template { message: String },
}

impl WorkflowError {
  pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  pub(crate) fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected {
      message: message.into(),
    }
  }

  /// Stored report of a scan that failed its severity threshold.
  pub fn scan_report(&self) -> Option<&BlobManifest> {
    match self {
      WorkflowError::Activity { source, .. } => source.scan_report(),
      _ => None,
    }
  }
}
