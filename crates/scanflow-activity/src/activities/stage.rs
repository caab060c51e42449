use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use scanflow_blob::ChunkedBlob;
use scanflow_host_kv::KvStore;
use tracing::info;

use crate::activity::{Activity, ActivityContext};
use crate::error::ActivityError;
use crate::sbom::SbomSource;
use crate::types::{SbomRequest, StagedSbom};

/// Moves the target's SBOM through the state store and onto local disk.
///
/// The document is split into `sbom-<instance id>-<n>` chunks so that no
/// single store entry exceeds the per-key limit, then read back,
/// reassembled and written to `<staging_dir>/sbom-<instance id>.json` for
/// the scanner.
pub struct StageSbomActivity {
  store: Arc<dyn KvStore>,
  source: Arc<dyn SbomSource>,
  chunk_size: usize,
  staging_dir: PathBuf,
  retain_chunks: bool,
}

impl StageSbomActivity {
  pub fn new(
    store: Arc<dyn KvStore>,
    source: Arc<dyn SbomSource>,
    chunk_size: usize,
    staging_dir: PathBuf,
    retain_chunks: bool,
  ) -> Self {
    Self {
      store,
      source,
      chunk_size,
      staging_dir,
      retain_chunks,
    }
  }
}

#[async_trait]
impl Activity for StageSbomActivity {
  const NAME: &'static str = "StageSbomActivity";
  type Input = SbomRequest;
  type Output = StagedSbom;

  async fn run(&self, ctx: &ActivityContext, input: SbomRequest) -> Result<StagedSbom, ActivityError> {
    let sbom = self.source.load(&input.target).await?;

    let blob = ChunkedBlob::new(format!("sbom-{}", input.request_id), self.chunk_size)?;
    let manifest = blob.store(self.store.as_ref(), &sbom).await?;
    let staged = manifest.load(self.store.as_ref()).await?;

    if !self.retain_chunks {
      manifest.remove(self.store.as_ref()).await?;
    }

    tokio::fs::create_dir_all(&self.staging_dir)
      .await
      .map_err(|source| ActivityError::Staging {
        path: self.staging_dir.clone(),
        source,
      })?;
    let path = self.staging_dir.join(format!("sbom-{}.json", input.request_id));
    tokio::fs::write(&path, &staged)
      .await
      .map_err(|source| ActivityError::Staging {
        path: path.clone(),
        source,
      })?;

    info!(
      instance_id = %ctx.instance_id,
      chunks = manifest.chunk_count,
      bytes = staged.len(),
      path = %path.display(),
      "sbom staged"
    );

    Ok(StagedSbom {
      path,
      chunk_count: manifest.chunk_count,
      len: staged.len(),
    })
  }
}
