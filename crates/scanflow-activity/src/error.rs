//! Activity error types.

use scanflow_blob::{BlobError, BlobManifest};
use scanflow_host_kv::StoreError;
use scanflow_ledger::LedgerError;

use crate::sbom::SbomError;
use crate::scanner::ScanError;

/// Errors that can occur while executing an activity.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
  /// No handler is registered under this name.
  #[error("activity '{name}' is not registered")]
  NotRegistered { name: String },

  /// The input could not be decoded into the activity's envelope.
  #[error("invalid input for activity '{activity}': {message}")]
  InvalidInput { activity: String, message: String },

  /// The output could not be encoded or decoded.
  #[error("invalid output from activity '{activity}': {message}")]
  InvalidOutput { activity: String, message: String },

  /// The activity did not finish within the configured bound.
  #[error("activity '{activity}' timed out after {timeout_ms}ms")]
  Timeout { activity: String, timeout_ms: u64 },

  #[error("state store error: {0}")]
  Store(#[from] StoreError),

  #[error("chunked blob error: {0}")]
  Blob(#[from] BlobError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error(transparent)]
  Scan(#[from] ScanError),

  #[error(transparent)]
  Sbom(#[from] SbomError),

  /// The scan ran to completion but found issues at or above the configured
  /// severity. The report was persisted before the error was raised.
  #[error("vulnerabilities found at or above severity '{severity}'")]
  AboveSeverityThreshold {
    severity: String,
    report: BlobManifest,
  },

  /// Failed to write a staged file.
  #[error("failed to stage {}: {source}", path.display())]
  Staging {
    path: std::path::PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ActivityError {
  /// Stored report of a scan that finished above the severity threshold.
  pub fn scan_report(&self) -> Option<&BlobManifest> {
    match self {
      ActivityError::AboveSeverityThreshold { report, .. } => Some(report),
      _ => None,
    }
  }
}
