//! Scanflow Activity
//!
//! Activities are the externally visible steps of the scan-and-fulfillment
//! saga. Each one is a self-contained async function of a typed input
//! envelope to a typed output envelope with exactly one side effect: a log
//! line, a state-store read/write, or an external scanner run.
//!
//! The pieces:
//! - [`Activity`]: implemented by every step, typed in and out.
//! - [`ActivityRegistry`]: name-to-handler map; typed activities are erased
//!   to JSON at registration.
//! - [`ActivityExecutor`]: runs one call by name. No retries; an optional
//!   timeout is the only policy it applies.
//! - [`Scanner`] and [`SbomSource`]: the external collaborators the scan
//!   activities drive.

mod activity;
pub mod activities;
mod error;
mod executor;
mod registry;
mod sbom;
mod scanner;
mod types;

pub use activity::{Activity, ActivityContext, ActivityHandler};
pub use activities::{ActivityDeps, default_registry};
pub use error::ActivityError;
pub use executor::ActivityExecutor;
pub use registry::ActivityRegistry;
pub use sbom::{CommandSbomSource, FileSbomSource, SbomError, SbomSource};
pub use scanner::{CommandScanner, ScanError, Scanner};
pub use types::{
  ApprovalRequired, InventoryRequest, Notification, PaymentRequest, SbomRequest, ScanRequest,
  ScanOutcome, ScanResult, StagedSbom,
};

pub use scanflow_blob::BlobManifest;
pub use scanflow_ledger::{InventoryItem, InventoryResult};
