//! Scanflow Config
//!
//! This crate contains the serializable configuration types for scanflow.
//! A single [`ServiceConfig`] value is built at startup and handed to the
//! orchestrator, the activity registry and the control API; nothing reads
//! configuration from process-wide state after that.
//!
//! Configuration can be loaded from:
//! - a JSON file (via CLI with `--config=scanflow.json`)
//! - defaults, for local development and tests
//!
//! Every field is optional in the JSON document; missing fields fall back to
//! the values in [`ServiceConfig::default`].

mod collaborators;
mod error;
mod service;

pub use collaborators::{SbomConfig, ScannerConfig, StockItem, StoreConfig};
pub use error::ConfigError;
pub use service::{
  DEFAULT_CHUNK_SIZE, DEFAULT_MAX_VALUE_BYTES, DEFAULT_WORKFLOW_NAME, ServiceConfig,
};
