use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use scanflow_blob::ChunkedBlob;
use scanflow_host_kv::KvStore;
use tracing::{info, warn};

use crate::activity::{Activity, ActivityContext};
use crate::error::ActivityError;
use crate::scanner::{ScanError, Scanner};
use crate::types::{ScanOutcome, ScanRequest};

/// Runs the vulnerability scanner against the staged SBOM.
///
/// The report is written to the state store as `report-<instance id>-<n>`
/// chunks, including when the scan finished above the severity threshold.
pub struct ContainerScanActivity {
  scanner: Arc<dyn Scanner>,
  store: Arc<dyn KvStore>,
  chunk_size: usize,
}

impl ContainerScanActivity {
  pub fn new(scanner: Arc<dyn Scanner>, store: Arc<dyn KvStore>, chunk_size: usize) -> Self {
    Self {
      scanner,
      store,
      chunk_size,
    }
  }
}

#[async_trait]
impl Activity for ContainerScanActivity {
  const NAME: &'static str = "ContainerScanActivity";
  type Input = ScanRequest;
  type Output = ScanOutcome;

  async fn run(&self, ctx: &ActivityContext, input: ScanRequest) -> Result<ScanOutcome, ActivityError> {
    let path = PathBuf::from(&input.target);
    let blob = ChunkedBlob::new(format!("report-{}", input.request_id), self.chunk_size)?;

    match self.scanner.scan(&path, &input.output_format).await {
      Ok(report) => {
        let manifest = blob.store(self.store.as_ref(), &report).await?;
        info!(
          instance_id = %ctx.instance_id,
          format = %input.output_format,
          bytes = manifest.total_len,
          chunks = manifest.chunk_count,
          "scan completed"
        );
        Ok(ScanOutcome::succeeded(manifest))
      }
      Err(ScanError::AboveSeverityThreshold { severity, report }) => {
        let manifest = blob.store(self.store.as_ref(), &report).await?;
        warn!(
          instance_id = %ctx.instance_id,
          severity = %severity,
          bytes = manifest.total_len,
          "scan above severity threshold"
        );
        Err(ActivityError::AboveSeverityThreshold {
          severity,
          report: manifest,
        })
      }
      Err(e) => Err(e.into()),
    }
  }
}
