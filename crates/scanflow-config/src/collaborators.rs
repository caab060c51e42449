use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::service::DEFAULT_MAX_VALUE_BYTES;

/// Which key-value backend holds workflow checkpoints, chunks and inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
  /// Process-local store; state is lost on restart.
  Memory {
    #[serde(default = "default_max_value_bytes")]
    max_value_bytes: usize,
  },
  /// One file per key under `path` (defaults to `<data_dir>/<state_store>`).
  Fs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(default = "default_max_value_bytes")]
    max_value_bytes: usize,
  },
}

impl StoreConfig {
  /// Per-key value ceiling enforced by the store.
  pub fn max_value_bytes(&self) -> usize {
    match self {
      StoreConfig::Memory { max_value_bytes } | StoreConfig::Fs { max_value_bytes, .. } => {
        *max_value_bytes
      }
    }
  }
}

impl Default for StoreConfig {
  fn default() -> Self {
    StoreConfig::Fs {
      path: None,
      max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
    }
  }
}

fn default_max_value_bytes() -> usize {
  DEFAULT_MAX_VALUE_BYTES
}

/// External vulnerability scanner invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
  /// Scanner executable, resolved through `PATH`.
  #[serde(default = "default_scanner_program")]
  pub program: String,
  /// Severity at or above which a finished scan counts as failed
  /// (`negligible`, `low`, `medium`, `high`, `critical`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fail_on: Option<String>,
}

impl Default for ScannerConfig {
  fn default() -> Self {
    Self {
      program: default_scanner_program(),
      fail_on: None,
    }
  }
}

fn default_scanner_program() -> String {
  "grype".to_string()
}

/// Where the bill of materials for a scan target comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SbomConfig {
  /// A fixed SBOM document on disk, used for every target.
  File { path: PathBuf },
  /// Generate the SBOM by running a cataloger against the target.
  Command {
    #[serde(default = "default_sbom_program")]
    program: String,
  },
}

impl Default for SbomConfig {
  fn default() -> Self {
    SbomConfig::Command {
      program: default_sbom_program(),
    }
  }
}

fn default_sbom_program() -> String {
  "syft".to_string()
}

/// Base stock written to the store at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
  pub item_name: String,
  pub per_item_cost: u64,
  pub quantity: u64,
}
