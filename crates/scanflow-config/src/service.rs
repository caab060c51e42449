use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collaborators::{SbomConfig, ScannerConfig, StockItem, StoreConfig};
use crate::error::ConfigError;

/// Name under which workflow checkpoints are keyed.
pub const DEFAULT_WORKFLOW_NAME: &str = "ContainerScanWorkflow";

/// Largest slice written to a single state-store entry.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Per-key ceiling of the bundled stores.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

const DEFAULT_NOTIFY_TEMPLATE: &str =
  "Received workflow id {{ instance_id }} to perform a vulnerability scan on {{ target }}";

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Workflow name, used as the checkpoint key namespace.
  pub workflow_name: String,
  /// Name of the state store; the fs backend keeps its files under a
  /// directory of this name.
  pub state_store: String,
  /// Address the control API listens on.
  pub bind_address: String,
  /// Root for on-disk state and staged SBOMs (default: `~/.scanflow`).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
  /// Maximum bytes per persisted chunk.
  pub chunk_size: usize,
  /// Upper bound on instances in `Running` at once.
  pub max_concurrent_instances: usize,
  /// Threads in the instance worker runtime.
  pub worker_threads: usize,
  /// Optional bound on a single activity call. `None` waits indefinitely.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activity_timeout_ms: Option<u64>,
  /// Compare-and-swap attempts per inventory update before giving up.
  pub ledger_max_attempts: u32,
  /// Orders costing more than this are not approved.
  pub approval_limit: u64,
  /// minijinja template for the opening notification. Receives
  /// `instance_id` and `target`.
  pub notify_template: String,
  /// Run paired undo activities when a saga fails part way.
  pub compensate_on_failure: bool,
  /// Keep SBOM chunks in the store after reassembly.
  pub retain_chunks: bool,
  pub store: StoreConfig,
  pub scanner: ScannerConfig,
  pub sbom: SbomConfig,
  /// Base stock written at startup.
  pub inventory: Vec<StockItem>,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      workflow_name: DEFAULT_WORKFLOW_NAME.to_string(),
      state_store: "statestore".to_string(),
      bind_address: "0.0.0.0:8080".to_string(),
      data_dir: None,
      chunk_size: DEFAULT_CHUNK_SIZE,
      max_concurrent_instances: 16,
      worker_threads: 4,
      activity_timeout_ms: None,
      ledger_max_attempts: 8,
      approval_limit: 50_000,
      notify_template: DEFAULT_NOTIFY_TEMPLATE.to_string(),
      compensate_on_failure: true,
      retain_chunks: false,
      store: StoreConfig::default(),
      scanner: ScannerConfig::default(),
      sbom: SbomConfig::default(),
      inventory: Vec::new(),
    }
  }
}

impl ServiceConfig {
  /// Load and validate a configuration file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let config: ServiceConfig =
      serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      })?;

    config.validate()?;
    Ok(config)
  }

  /// Check cross-field constraints that serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.workflow_name.trim().is_empty() {
      return Err(ConfigError::invalid("workflow_name must not be empty"));
    }
    if self.workflow_name.contains("||") {
      return Err(ConfigError::invalid("workflow_name must not contain '||'"));
    }
    if self.chunk_size == 0 {
      return Err(ConfigError::invalid("chunk_size must be greater than zero"));
    }
    if self.chunk_size > self.store.max_value_bytes() {
      return Err(ConfigError::invalid(format!(
        "chunk_size ({}) exceeds the store's max_value_bytes ({})",
        self.chunk_size,
        self.store.max_value_bytes()
      )));
    }
    if self.max_concurrent_instances == 0 {
      return Err(ConfigError::invalid(
        "max_concurrent_instances must be greater than zero",
      ));
    }
    if self.worker_threads == 0 {
      return Err(ConfigError::invalid("worker_threads must be greater than zero"));
    }
    if self.ledger_max_attempts == 0 {
      return Err(ConfigError::invalid(
        "ledger_max_attempts must be greater than zero",
      ));
    }
    Ok(())
  }

  /// Directory for state files, falling back to `default` when unset.
  pub fn data_dir_or(&self, default: impl Into<PathBuf>) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(|| default.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = ServiceConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.chunk_size, 512 * 1024);
    assert_eq!(config.workflow_name, "ContainerScanWorkflow");
  }

  #[test]
  fn test_partial_document_uses_defaults() {
    let config: ServiceConfig = serde_json::from_str(
      r#"{
        "bind_address": "127.0.0.1:9000",
        "store": { "kind": "memory" },
        "sbom": { "kind": "file", "path": "/tmp/sbom.cdx.json" },
        "inventory": [{ "item_name": "widget", "per_item_cost": 10, "quantity": 5 }]
      }"#,
    )
    .unwrap();

    assert_eq!(config.bind_address, "127.0.0.1:9000");
    assert_eq!(
      config.store,
      StoreConfig::Memory {
        max_value_bytes: DEFAULT_MAX_VALUE_BYTES
      }
    );
    assert_eq!(
      config.sbom,
      SbomConfig::File {
        path: PathBuf::from("/tmp/sbom.cdx.json")
      }
    );
    assert_eq!(config.inventory.len(), 1);
    assert_eq!(config.max_concurrent_instances, 16);
  }

  #[test]
  fn test_rejects_zero_chunk_size() {
    let config = ServiceConfig {
      chunk_size: 0,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
  }

  #[test]
  fn test_rejects_chunk_larger_than_store_limit() {
    let config = ServiceConfig {
      chunk_size: 2048,
      store: StoreConfig::Memory {
        max_value_bytes: 1024,
      },
      ..Default::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("exceeds"));
  }

  #[test]
  fn test_from_path_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scanflow.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = ServiceConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn test_from_path_missing_file() {
    let err = ServiceConfig::from_path("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
