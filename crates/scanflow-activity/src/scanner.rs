//! Vulnerability scanner collaborator.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Errors produced by a scanner run.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
  #[error("failed to launch scanner '{program}': {source}")]
  Launch {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("scanner exited with {status}: {stderr}")]
  Exit { status: String, stderr: String },

  /// The scan ran to completion but found issues at or above the configured
  /// severity. The report is still available.
  #[error("vulnerabilities found at or above severity '{severity}'")]
  AboveSeverityThreshold { severity: String, report: Bytes },
}

/// Scans a staged SBOM and returns the report bytes.
#[async_trait]
pub trait Scanner: Send + Sync {
  async fn scan(&self, sbom_path: &Path, output_format: &str) -> Result<Bytes, ScanError>;
}

/// Runs a grype-compatible CLI:
/// `<program> sbom:<path> -o <format> [--fail-on <severity>]`.
#[derive(Debug, Clone)]
pub struct CommandScanner {
  program: String,
  fail_on: Option<String>,
}

impl CommandScanner {
  pub fn new(program: impl Into<String>, fail_on: Option<String>) -> Self {
    Self {
      program: program.into(),
      fail_on,
    }
  }
}

#[async_trait]
impl Scanner for CommandScanner {
  async fn scan(&self, sbom_path: &Path, output_format: &str) -> Result<Bytes, ScanError> {
    let mut command = tokio::process::Command::new(&self.program);
    command
      .arg(format!("sbom:{}", sbom_path.display()))
      .arg("-o")
      .arg(output_format);
    if let Some(severity) = &self.fail_on {
      command.arg("--fail-on").arg(severity);
    }

    debug!(program = %self.program, path = %sbom_path.display(), "scanner_spawn");

    let output = command
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|source| ScanError::Launch {
        program: self.program.clone(),
        source,
      })?;

    if output.status.success() {
      return Ok(Bytes::from(output.stdout));
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match &self.fail_on {
      Some(severity) if stderr.contains("severity threshold") => {
        Err(ScanError::AboveSeverityThreshold {
          severity: severity.clone(),
          report: Bytes::from(output.stdout),
        })
      }
      _ => Err(ScanError::Exit {
        status: output.status.to_string(),
        stderr,
      }),
    }
  }
}
