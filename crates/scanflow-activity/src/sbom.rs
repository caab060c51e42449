//! SBOM sources.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum SbomError {
  #[error("failed to read SBOM from {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("SBOM generator '{program}' failed: {message}")]
  Command { program: String, message: String },
}

/// Produces the SBOM document for a scan target.
#[async_trait]
pub trait SbomSource: Send + Sync {
  async fn load(&self, target: &str) -> Result<Bytes, SbomError>;
}

/// Serves the same pre-generated SBOM for every target.
#[derive(Debug, Clone)]
pub struct FileSbomSource {
  path: PathBuf,
}

impl FileSbomSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl SbomSource for FileSbomSource {
  async fn load(&self, _target: &str) -> Result<Bytes, SbomError> {
    tokio::fs::read(&self.path)
      .await
      .map(Bytes::from)
      .map_err(|source| SbomError::Read {
        path: self.path.clone(),
        source,
      })
  }
}

/// Generates an SBOM with a syft-compatible CLI:
/// `<program> <target> -o cyclonedx-json`.
#[derive(Debug, Clone)]
pub struct CommandSbomSource {
  program: String,
}

impl CommandSbomSource {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

#[async_trait]
impl SbomSource for CommandSbomSource {
  async fn load(&self, target: &str) -> Result<Bytes, SbomError> {
    let output = tokio::process::Command::new(&self.program)
      .arg(target)
      .arg("-o")
      .arg("cyclonedx-json")
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| SbomError::Command {
        program: self.program.clone(),
        message: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(SbomError::Command {
        program: self.program.clone(),
        message: format!(
          "exited with {}: {}",
          output.status,
          String::from_utf8_lossy(&output.stderr).trim()
        ),
      });
    }

    Ok(Bytes::from(output.stdout))
  }
}
