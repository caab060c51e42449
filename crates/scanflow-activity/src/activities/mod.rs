//! Built-in saga activities.

mod inventory;
mod notify;
mod payment;
mod scan;
mod stage;

use std::path::PathBuf;
use std::sync::Arc;

use scanflow_host_kv::KvStore;
use scanflow_ledger::Ledger;

use crate::registry::ActivityRegistry;
use crate::sbom::SbomSource;
use crate::scanner::Scanner;

pub use inventory::{UpdateInventoryActivity, VerifyInventoryActivity};
pub use notify::NotifyActivity;
pub use payment::{ProcessPaymentActivity, RefundPaymentActivity, RequestApprovalActivity};
pub use scan::ContainerScanActivity;
pub use stage::StageSbomActivity;

/// Everything the built-in activities need from the host.
#[derive(Clone)]
pub struct ActivityDeps {
  pub store: Arc<dyn KvStore>,
  pub ledger: Ledger,
  pub scanner: Arc<dyn Scanner>,
  pub sbom_source: Arc<dyn SbomSource>,
  /// Maximum bytes per SBOM or report chunk written to the store.
  pub chunk_size: usize,
  /// Directory staged SBOM files are written to.
  pub staging_dir: PathBuf,
  pub retain_chunks: bool,
  pub approval_limit: u64,
}

/// Registry holding every built-in activity.
pub fn default_registry(deps: ActivityDeps) -> ActivityRegistry {
  let mut registry = ActivityRegistry::new();
  registry
    .register(NotifyActivity)
    .register(StageSbomActivity::new(
      deps.store.clone(),
      deps.sbom_source.clone(),
      deps.chunk_size,
      deps.staging_dir.clone(),
      deps.retain_chunks,
    ))
    .register(ContainerScanActivity::new(
      deps.scanner.clone(),
      deps.store.clone(),
      deps.chunk_size,
    ))
    .register(VerifyInventoryActivity::new(deps.ledger.clone()))
    .register(UpdateInventoryActivity::new(deps.ledger.clone()))
    .register(RequestApprovalActivity::new(deps.approval_limit))
    .register(ProcessPaymentActivity)
    .register(RefundPaymentActivity);
  registry
}
