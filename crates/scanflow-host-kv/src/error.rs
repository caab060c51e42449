use thiserror::Error;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The key cannot be used with this backend.
  #[error("invalid key '{key}': {message}")]
  InvalidKey { key: String, message: String },

  /// The value exceeds the per-key ceiling.
  #[error("value for key '{key}' is {size} bytes, store limit is {limit}")]
  TooLarge {
    key: String,
    size: usize,
    limit: usize,
  },

  /// A conditional save found a different version (or presence) than expected.
  #[error("version conflict on key '{key}'")]
  Conflict { key: String },

  /// The stored bytes could not be interpreted as an entry.
  #[error("corrupt entry for key '{key}': {message}")]
  Corrupt { key: String, message: String },

  /// The backend failed to read or write.
  #[error("io error on key '{key}': {source}")]
  Io {
    key: String,
    #[source]
    source: std::io::Error,
  },
}

impl StoreError {
  pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidKey {
      key: key.into(),
      message: message.into(),
    }
  }

  pub fn conflict(key: impl Into<String>) -> Self {
    Self::Conflict { key: key.into() }
  }

  /// Whether this is a failed precondition rather than a backend fault.
  pub fn is_conflict(&self) -> bool {
    matches!(self, StoreError::Conflict { .. })
  }
}
