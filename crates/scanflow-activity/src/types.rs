//! Input and output envelopes for the built-in activities.
//!
//! Envelopes are plain serde types; they are built by the orchestrator,
//! consumed by one activity call and never mutated.

use std::path::PathBuf;

use scanflow_blob::{BlobError, BlobManifest};
use scanflow_host_kv::KvStore;
use serde::{Deserialize, Serialize};

/// Message for the notify activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub message: String,
}

/// Ask for the SBOM of `target` to be staged through the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbomRequest {
  pub request_id: String,
  pub target: String,
}

/// Where a staged SBOM ended up after its chunk round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedSbom {
  /// Local file holding the reassembled SBOM.
  pub path: PathBuf,
  /// Chunks the SBOM was persisted as.
  pub chunk_count: usize,
  /// Size in bytes.
  pub len: usize,
}

/// Scan a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
  pub request_id: String,
  /// Filesystem path handed to the scanner.
  pub target: String,
  pub output_format: String,
}

/// Outcome of a scan as recorded in workflow history.
///
/// The report itself is kept in the state store as chunks; only the manifest
/// travels through checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
  pub succeeded: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub report: Option<BlobManifest>,
}

impl ScanOutcome {
  pub fn succeeded(report: BlobManifest) -> Self {
    Self {
      succeeded: true,
      report: Some(report),
    }
  }

  pub fn failed(report: Option<BlobManifest>) -> Self {
    Self {
      succeeded: false,
      report,
    }
  }

  /// Read the report back out of the store.
  pub async fn resolve(&self, store: &dyn KvStore) -> Result<ScanResult, BlobError> {
    let result = match &self.report {
      Some(manifest) => Some(manifest.load(store).await?.to_vec()),
      None => None,
    };
    Ok(ScanResult {
      succeeded: self.succeeded,
      result,
    })
  }
}

/// A scan outcome with its report bytes, as shown to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
  pub succeeded: bool,
  /// Opaque scanner report, base64 in JSON.
  #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
  pub result: Option<Vec<u8>>,
}

impl ScanResult {
  pub fn succeeded(report: impl Into<Vec<u8>>) -> Self {
    Self {
      succeeded: true,
      result: Some(report.into()),
    }
  }

  pub fn failed(report: Option<Vec<u8>>) -> Self {
    Self {
      succeeded: false,
      result: report,
    }
  }
}

/// Check stock for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRequest {
  pub request_id: String,
  pub item_name: String,
  pub quantity: u64,
}

/// A purchase, used by approval, payment, refund and inventory update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
  pub request_id: String,
  pub item_being_purchased: String,
  /// Total cost of the order.
  pub amount: u64,
  pub quantity: u64,
}

/// Approval decision for a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequired {
  pub approval: bool,
}

mod base64_bytes {
  use base64::Engine;
  use base64::engine::general_purpose::STANDARD;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    Option::<String>::deserialize(deserializer)?
      .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
      .transpose()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_scan_result_report_is_base64() {
    let result = ScanResult::succeeded(b"{\"runs\":[]}".to_vec());
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["succeeded"], true);
    assert_eq!(json["result"], "eyJydW5zIjpbXX0=");

    let back: ScanResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
  }

  #[test]
  fn test_scan_result_without_report() {
    let json = serde_json::to_string(&ScanResult::failed(None)).unwrap();
    assert_eq!(json, r#"{"succeeded":false}"#);

    let back: ScanResult = serde_json::from_str(r#"{"succeeded":false,"result":null}"#).unwrap();
    assert_eq!(back.result, None);
  }

  #[tokio::test]
  async fn test_outcome_resolves_chunked_report() {
    use bytes::Bytes;
    use scanflow_blob::ChunkedBlob;
    use scanflow_host_kv::InMemoryKvStore;

    let store = InMemoryKvStore::new(64);
    let report = Bytes::from(vec![b'x'; 150]);
    let manifest = ChunkedBlob::new("report-abc", 64)
      .unwrap()
      .store(&store, &report)
      .await
      .unwrap();

    let outcome = ScanOutcome::succeeded(manifest);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["report"]["chunk_count"], 3);

    let resolved = outcome.resolve(&store).await.unwrap();
    assert!(resolved.succeeded);
    assert_eq!(resolved.result.unwrap(), report.to_vec());

    let empty = ScanOutcome::failed(None).resolve(&store).await.unwrap();
    assert_eq!(empty, ScanResult::failed(None));
  }
}
