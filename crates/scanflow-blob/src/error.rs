use scanflow_host_kv::StoreError;

/// Errors from splitting, persisting or reconstructing a chunked blob.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
  /// Chunk size must be positive.
  #[error("chunk size must be greater than zero")]
  InvalidChunkSize,

  /// A chunk is larger than the store accepts per key.
  #[error("chunk size {chunk_size} exceeds the store limit of {limit} bytes")]
  ChunkTooLarge { chunk_size: usize, limit: usize },

  /// A chunk key had no value during reconstruction.
  #[error("chunk '{key}' is missing")]
  MissingChunk { key: String },

  /// A chunk key could not be read during reconstruction.
  #[error("chunk '{key}' could not be read: {source}")]
  UnreadableChunk {
    key: String,
    #[source]
    source: StoreError,
  },

  /// An index in `[0, count)` was never supplied.
  #[error("chunk index {index} is missing")]
  MissingIndex { index: usize },

  /// An index outside `[0, count)` was supplied.
  #[error("chunk index {index} is out of range for a blob of {count} chunks")]
  IndexOutOfRange { index: usize, count: usize },

  /// The same index was supplied twice.
  #[error("chunk index {index} was supplied more than once")]
  DuplicateChunk { index: usize },

  /// Reassembled bytes do not match the recorded length.
  #[error("reassembled {actual} bytes, expected {expected}")]
  LengthMismatch { expected: usize, actual: usize },

  /// Writing or deleting a chunk failed.
  #[error("state store error: {0}")]
  Store(#[from] StoreError),
}

impl BlobError {
  /// Whether this error means the stored blob cannot be reconstructed.
  pub fn is_reconstruction_failure(&self) -> bool {
    matches!(
      self,
      BlobError::MissingChunk { .. }
        | BlobError::MissingIndex { .. }
        | BlobError::UnreadableChunk { .. }
        | BlobError::IndexOutOfRange { .. }
        | BlobError::DuplicateChunk { .. }
        | BlobError::LengthMismatch { .. }
    )
  }
}
