use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
  Entry, KvStore, SaveCondition, StoreError, Version, check_key, check_write, condition_holds,
};

/// Size of the big-endian version header in front of every value.
const HEADER_LEN: usize = 8;

/// Filesystem-based KV store.
///
/// Each key is stored at `{base_path}/{key}` as an 8-byte version header
/// followed by the value. Writes go to a temporary sibling and are renamed
/// into place, so readers never observe a half-written entry.
///
/// Conditional saves are serialized by an in-process lock; the store assumes
/// it is the only process writing under `base_path`.
pub struct FsKvStore {
  base_path: PathBuf,
  max_value_bytes: usize,
  write_lock: Mutex<()>,
}

impl FsKvStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>, max_value_bytes: usize) -> Self {
    Self {
      base_path: base_path.into(),
      max_value_bytes,
      write_lock: Mutex::new(()),
    }
  }

  fn key_to_path(&self, key: &str) -> Result<PathBuf, StoreError> {
    check_key(key)?;
    if key.starts_with('.') {
      return Err(StoreError::invalid_key(key, "key must not start with '.'"));
    }
    if let Some(c) = key
      .chars()
      .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '|' | ':')))
    {
      return Err(StoreError::invalid_key(
        key,
        format!("character '{c}' is not allowed in file-backed keys"),
      ));
    }
    Ok(self.base_path.join(key))
  }

  async fn read_entry(&self, key: &str, path: &Path) -> Result<Option<Entry>, StoreError> {
    let raw = match fs::read(path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StoreError::Io {
          key: key.to_string(),
          source,
        });
      }
    };

    if raw.len() < HEADER_LEN {
      return Err(StoreError::Corrupt {
        key: key.to_string(),
        message: format!("entry is {} bytes, shorter than its header", raw.len()),
      });
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&raw[..HEADER_LEN]);
    let version = u64::from_be_bytes(header);
    let mut raw = Bytes::from(raw);
    let value = raw.split_off(HEADER_LEN);

    Ok(Some(Entry { value, version }))
  }
}

#[async_trait]
impl KvStore for FsKvStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
    let path = self.key_to_path(key)?;
    self.read_entry(key, &path).await
  }

  async fn save(
    &self,
    key: &str,
    value: Bytes,
    condition: SaveCondition,
  ) -> Result<Version, StoreError> {
    check_write(key, &value, self.max_value_bytes)?;
    let path = self.key_to_path(key)?;
    let io_err = |source| StoreError::Io {
      key: key.to_string(),
      source,
    };

    let _guard = self.write_lock.lock().await;

    let current = self.read_entry(key, &path).await?.map(|e| e.version);
    if !condition_holds(condition, current) {
      return Err(StoreError::conflict(key));
    }
    let version = current.map_or(1, |v| v + 1);

    fs::create_dir_all(&self.base_path).await.map_err(io_err)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + value.len());
    buf.put_u64(version);
    buf.put_slice(&value);

    let tmp = self.base_path.join(format!(".{key}.tmp"));
    fs::write(&tmp, &buf).await.map_err(io_err)?;
    fs::rename(&tmp, &path).await.map_err(io_err)?;

    debug!(key = %key, version, bytes = value.len(), "entry saved");
    Ok(version)
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let path = self.key_to_path(key)?;
    let _guard = self.write_lock.lock().await;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StoreError::Io {
        key: key.to_string(),
        source,
      }),
    }
  }

  fn max_value_bytes(&self) -> usize {
    self.max_value_bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_fs_round_trip_and_versions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsKvStore::new(dir.path().join("statestore"), 1024);

    assert_eq!(store.get("order_1").await.unwrap(), None);

    let v1 = store.put("order_1", Bytes::from_static(b"42")).await.unwrap();
    assert_eq!(v1, 1);
    let entry = store.get("order_1").await.unwrap().unwrap();
    assert_eq!(entry.value, Bytes::from_static(b"42"));
    assert_eq!(entry.version, 1);

    let v2 = store
      .save("order_1", Bytes::from_static(b"43"), SaveCondition::Matches(v1))
      .await
      .unwrap();
    assert_eq!(v2, 2);

    let err = store
      .save("order_1", Bytes::from_static(b"44"), SaveCondition::Matches(v1))
      .await
      .unwrap_err();
    assert!(err.is_conflict());

    store.delete("order_1").await.unwrap();
    assert_eq!(store.get("order_1").await.unwrap(), None);
    store.delete("order_1").await.unwrap();
  }

  #[tokio::test]
  async fn test_fs_empty_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsKvStore::new(dir.path(), 1024);

    store.put("empty", Bytes::new()).await.unwrap();
    let entry = store.get("empty").await.unwrap().unwrap();
    assert!(entry.value.is_empty());
  }

  #[tokio::test]
  async fn test_fs_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
      let store = FsKvStore::new(dir.path(), 1024);
      store
        .put("ContainerScanWorkflow||abc", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    }

    let reopened = FsKvStore::new(dir.path(), 1024);
    let entry = reopened
      .get("ContainerScanWorkflow||abc")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(entry.value, Bytes::from_static(b"{}"));
  }

  #[tokio::test]
  async fn test_fs_rejects_path_like_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsKvStore::new(dir.path(), 1024);

    for key in ["../escape", "a/b", ".hidden"] {
      let err = store.put(key, Bytes::from_static(b"x")).await.unwrap_err();
      assert!(matches!(err, StoreError::InvalidKey { .. }), "key {key}");
    }
  }

  #[tokio::test]
  async fn test_fs_corrupt_entry() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("short"), b"abc").unwrap();
    let store = FsKvStore::new(dir.path(), 1024);

    let err = store.get("short").await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
  }
}
