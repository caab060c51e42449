use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{
  Entry, KvStore, SaveCondition, StoreError, Version, check_key, check_write, condition_holds,
};

/// In-memory KV store implementation.
///
/// Suitable for tests and single-process runs. Conditional saves are atomic
/// with respect to every other call on the same store.
#[derive(Debug)]
pub struct InMemoryKvStore {
  data: RwLock<HashMap<String, Entry>>,
  max_value_bytes: usize,
}

impl InMemoryKvStore {
  pub fn new(max_value_bytes: usize) -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      max_value_bytes,
    }
  }

  /// Number of keys currently stored.
  pub async fn len(&self) -> usize {
    self.data.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.data.read().await.is_empty()
  }

  /// All keys with the given prefix, sorted.
  pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
    let data = self.data.read().await;
    let mut keys: Vec<String> = data
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect();
    keys.sort();
    keys
  }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
    check_key(key)?;
    Ok(self.data.read().await.get(key).cloned())
  }

  async fn save(
    &self,
    key: &str,
    value: Bytes,
    condition: SaveCondition,
  ) -> Result<Version, StoreError> {
    check_write(key, &value, self.max_value_bytes)?;

    let mut data = self.data.write().await;
    let current = data.get(key).map(|e| e.version);
    if !condition_holds(condition, current) {
      return Err(StoreError::conflict(key));
    }

    let version = current.map_or(1, |v| v + 1);
    data.insert(key.to_string(), Entry { value, version });
    Ok(version)
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    check_key(key)?;
    self.data.write().await.remove(key);
    Ok(())
  }

  fn max_value_bytes(&self) -> usize {
    self.max_value_bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_in_memory_kv_store() {
    let store = InMemoryKvStore::new(1024);

    assert_eq!(store.get("key").await.unwrap(), None);

    let v1 = store.put("key", Bytes::from_static(b"value")).await.unwrap();
    let entry = store.get("key").await.unwrap().unwrap();
    assert_eq!(entry.value, Bytes::from_static(b"value"));
    assert_eq!(entry.version, v1);

    let v2 = store.put("key", Bytes::from_static(b"updated")).await.unwrap();
    assert!(v2 > v1);
    assert_eq!(
      store.get("key").await.unwrap().unwrap().value,
      Bytes::from_static(b"updated")
    );

    store.delete("key").await.unwrap();
    assert_eq!(store.get("key").await.unwrap(), None);

    // deleting again is fine
    store.delete("key").await.unwrap();
  }

  #[tokio::test]
  async fn test_conditional_save() {
    let store = InMemoryKvStore::new(1024);

    let v1 = store
      .save("item", Bytes::from_static(b"a"), SaveCondition::Absent)
      .await
      .unwrap();

    let err = store
      .save("item", Bytes::from_static(b"b"), SaveCondition::Absent)
      .await
      .unwrap_err();
    assert!(err.is_conflict());

    let v2 = store
      .save("item", Bytes::from_static(b"b"), SaveCondition::Matches(v1))
      .await
      .unwrap();

    // stale token loses
    let err = store
      .save("item", Bytes::from_static(b"c"), SaveCondition::Matches(v1))
      .await
      .unwrap_err();
    assert!(err.is_conflict());

    let entry = store.get("item").await.unwrap().unwrap();
    assert_eq!(entry.value, Bytes::from_static(b"b"));
    assert_eq!(entry.version, v2);
  }

  #[tokio::test]
  async fn test_matches_on_absent_key_conflicts() {
    let store = InMemoryKvStore::new(1024);
    let err = store
      .save("ghost", Bytes::from_static(b"x"), SaveCondition::Matches(1))
      .await
      .unwrap_err();
    assert!(err.is_conflict());
    assert!(store.is_empty().await);
  }

  #[tokio::test]
  async fn test_size_ceiling() {
    let store = InMemoryKvStore::new(4);
    let err = store
      .put("big", Bytes::from_static(b"12345"))
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      StoreError::TooLarge {
        size: 5,
        limit: 4,
        ..
      }
    ));
    assert_eq!(store.get("big").await.unwrap(), None);

    store.put("fits", Bytes::from_static(b"1234")).await.unwrap();
  }

  #[tokio::test]
  async fn test_empty_key_rejected() {
    let store = InMemoryKvStore::new(16);
    assert!(matches!(
      store.get("").await,
      Err(StoreError::InvalidKey { .. })
    ));
  }
}
