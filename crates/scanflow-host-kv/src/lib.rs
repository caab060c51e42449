//! Scanflow Host KV
//!
//! The state store collaborator. Workflow checkpoints, SBOM chunks and
//! inventory records all live behind the [`KvStore`] trait as opaque bytes.
//!
//! Every entry carries a [`Version`] token that changes on each write. The
//! token is what makes [`SaveCondition::Matches`] possible: a conditional save
//! that only lands if nobody else wrote the key since it was read. There is
//! no multi-key atomicity.
//!
//! Stores enforce a per-key size ceiling ([`KvStore::max_value_bytes`]);
//! payloads larger than that have to be chunked by the caller.

mod error;
mod fs;
mod memory;

pub use error::StoreError;
pub use fs::FsKvStore;
pub use memory::InMemoryKvStore;

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque per-entry version token. Starts at 1 and grows on each write.
pub type Version = u64;

/// A stored value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub value: Bytes,
  pub version: Version,
}

/// Precondition for [`KvStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveCondition {
  /// Write unconditionally.
  Any,
  /// Only write if the key does not exist yet.
  Absent,
  /// Only write if the key is still at this version.
  Matches(Version),
}

/// Trait for the shared key-value state store.
///
/// This trait is async to support networked backends.
#[async_trait]
pub trait KvStore: Send + Sync {
  /// Get a value and its version. Absent keys are `Ok(None)`.
  async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

  /// Write a value if `condition` holds, returning the new version.
  ///
  /// A failed precondition is [`StoreError::Conflict`]; the stored value is
  /// left untouched.
  async fn save(
    &self,
    key: &str,
    value: Bytes,
    condition: SaveCondition,
  ) -> Result<Version, StoreError>;

  /// Delete a value. Deleting an absent key is not an error.
  async fn delete(&self, key: &str) -> Result<(), StoreError>;

  /// Largest value, in bytes, a single key may hold.
  fn max_value_bytes(&self) -> usize;

  /// Unconditional save.
  async fn put(&self, key: &str, value: Bytes) -> Result<Version, StoreError> {
    self.save(key, value, SaveCondition::Any).await
  }
}

/// Shared checks every backend applies before touching storage.
pub(crate) fn check_write(key: &str, value: &Bytes, limit: usize) -> Result<(), StoreError> {
  check_key(key)?;
  if value.len() > limit {
    return Err(StoreError::TooLarge {
      key: key.to_string(),
      size: value.len(),
      limit,
    });
  }
  Ok(())
}

pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
  if key.is_empty() {
    return Err(StoreError::invalid_key(key, "key must not be empty"));
  }
  Ok(())
}

/// Whether `condition` admits a write over an entry currently at `current`.
pub(crate) fn condition_holds(condition: SaveCondition, current: Option<Version>) -> bool {
  match (condition, current) {
    (SaveCondition::Any, _) => true,
    (SaveCondition::Absent, None) => true,
    (SaveCondition::Absent, Some(_)) => false,
    (SaveCondition::Matches(expected), Some(actual)) => expected == actual,
    (SaveCondition::Matches(_), None) => false,
  }
}
