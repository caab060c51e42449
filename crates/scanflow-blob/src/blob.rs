use bytes::Bytes;
use scanflow_host_kv::KvStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{delete, fetch, persist, reassemble, split};
use crate::error::BlobError;

/// Record of a blob written to the store; enough to read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobManifest {
  /// Key prefix; chunk `i` is stored at `{prefix}-{i}`.
  pub prefix: String,
  /// Number of chunks written.
  pub chunk_count: usize,
  /// Length of the original payload.
  pub total_len: usize,
}

impl BlobManifest {
  /// Fetch and reassemble the blob, verifying its length.
  pub async fn load(&self, store: &dyn KvStore) -> Result<Bytes, BlobError> {
    let chunks = fetch(store, &self.prefix, self.chunk_count).await?;
    let payload = reassemble(&chunks);
    if payload.len() != self.total_len {
      return Err(BlobError::LengthMismatch {
        expected: self.total_len,
        actual: payload.len(),
      });
    }

    debug!(
      prefix = %self.prefix,
      chunks = self.chunk_count,
      bytes = payload.len(),
      "blob reassembled"
    );
    Ok(payload)
  }

  /// Delete every chunk of the blob.
  pub async fn remove(&self, store: &dyn KvStore) -> Result<(), BlobError> {
    delete(store, &self.prefix, self.chunk_count).await
  }
}

/// A blob writer bound to a key prefix and chunk size.
#[derive(Debug, Clone)]
pub struct ChunkedBlob {
  prefix: String,
  chunk_size: usize,
}

impl ChunkedBlob {
  pub fn new(prefix: impl Into<String>, chunk_size: usize) -> Result<Self, BlobError> {
    if chunk_size == 0 {
      return Err(BlobError::InvalidChunkSize);
    }
    Ok(Self {
      prefix: prefix.into(),
      chunk_size,
    })
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  /// Split `payload` and persist every chunk.
  pub async fn store(&self, store: &dyn KvStore, payload: &Bytes) -> Result<BlobManifest, BlobError> {
    let limit = store.max_value_bytes();
    if self.chunk_size > limit {
      return Err(BlobError::ChunkTooLarge {
        chunk_size: self.chunk_size,
        limit,
      });
    }

    let chunks = split(payload, self.chunk_size)?;
    persist(store, &self.prefix, &chunks).await?;

    debug!(
      prefix = %self.prefix,
      chunks = chunks.len(),
      bytes = payload.len(),
      "blob persisted"
    );

    Ok(BlobManifest {
      prefix: self.prefix.clone(),
      chunk_count: chunks.len(),
      total_len: payload.len(),
    })
  }
}

#[cfg(test)]
mod tests {
  use scanflow_host_kv::InMemoryKvStore;

  use super::*;
  use crate::codec::chunk_key;

  const KIB: usize = 1024;

  fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 256) as u8).collect::<Vec<u8>>().into()
  }

  #[tokio::test]
  async fn test_sbom_sized_payload_makes_three_chunks() {
    let store = InMemoryKvStore::new(KIB * KIB);
    let sbom = payload(1536 * KIB);

    let blob = ChunkedBlob::new("sbom-instance", 512 * KIB).unwrap();
    let manifest = blob.store(&store, &sbom).await.unwrap();

    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(
      store.keys_with_prefix("sbom-instance-").await,
      vec!["sbom-instance-0", "sbom-instance-1", "sbom-instance-2"]
    );

    let restored = manifest.load(&store).await.unwrap();
    assert_eq!(restored.len(), sbom.len());
    assert_eq!(restored, sbom);
  }

  #[tokio::test]
  async fn test_missing_chunk_aborts_reconstruction() {
    let store = InMemoryKvStore::new(KIB);
    let blob = ChunkedBlob::new("report", 100).unwrap();
    let manifest = blob.store(&store, &payload(350)).await.unwrap();
    assert_eq!(manifest.chunk_count, 4);

    store.delete(&chunk_key("report", 2)).await.unwrap();

    let err = manifest.load(&store).await.unwrap_err();
    assert!(matches!(err, BlobError::MissingChunk { ref key } if key == "report-2"));
  }

  #[tokio::test]
  async fn test_overwritten_chunk_is_detected_by_length() {
    let store = InMemoryKvStore::new(KIB);
    let blob = ChunkedBlob::new("doc", 10).unwrap();
    let manifest = blob.store(&store, &payload(25)).await.unwrap();

    store
      .put(&chunk_key("doc", 2), Bytes::from_static(b"x"))
      .await
      .unwrap();

    let err = manifest.load(&store).await.unwrap_err();
    assert!(matches!(
      err,
      BlobError::LengthMismatch {
        expected: 25,
        actual: 21
      }
    ));
  }

  #[tokio::test]
  async fn test_empty_payload_round_trip() {
    let store = InMemoryKvStore::new(KIB);
    let blob = ChunkedBlob::new("empty", 16).unwrap();
    let manifest = blob.store(&store, &Bytes::new()).await.unwrap();

    assert_eq!(manifest.chunk_count, 0);
    assert!(store.is_empty().await);
    assert_eq!(manifest.load(&store).await.unwrap(), Bytes::new());
  }

  #[tokio::test]
  async fn test_chunk_size_above_store_limit() {
    let store = InMemoryKvStore::new(64);
    let blob = ChunkedBlob::new("big", 128).unwrap();
    let err = blob.store(&store, &payload(10)).await.unwrap_err();
    assert!(matches!(
      err,
      BlobError::ChunkTooLarge {
        chunk_size: 128,
        limit: 64
      }
    ));
  }

  #[tokio::test]
  async fn test_remove_deletes_all_chunks() {
    let store = InMemoryKvStore::new(KIB);
    let blob = ChunkedBlob::new("tmp", 8).unwrap();
    let manifest = blob.store(&store, &payload(20)).await.unwrap();
    assert_eq!(store.len().await, 3);

    manifest.remove(&store).await.unwrap();
    assert!(store.is_empty().await);
  }
}
