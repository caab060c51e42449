use std::sync::Arc;

use bytes::Bytes;
use scanflow_host_kv::{KvStore, SaveCondition};
use tracing::debug;

use crate::error::WorkflowError;
use crate::state::WorkflowState;

const INDEX_MAX_ATTEMPTS: u32 = 16;

/// Persists [`WorkflowState`] under `<workflow name>||<instance id>` and
/// keeps an index of resumable instances under `<workflow name>||index`.
///
/// Ids enter the index when an instance is created and leave it once the
/// instance's terminal state is saved, so the index stays as small as the
/// set of unfinished instances.
#[derive(Clone)]
pub struct CheckpointStore {
  store: Arc<dyn KvStore>,
  workflow_name: String,
}

impl CheckpointStore {
  pub fn new(store: Arc<dyn KvStore>, workflow_name: impl Into<String>) -> Self {
    Self {
      store,
      workflow_name: workflow_name.into(),
    }
  }

  pub fn workflow_name(&self) -> &str {
    &self.workflow_name
  }

  pub(crate) fn store(&self) -> &dyn KvStore {
    self.store.as_ref()
  }

  fn key(&self, instance_id: &str) -> String {
    format!("{}||{}", self.workflow_name, instance_id)
  }

  fn index_key(&self) -> String {
    format!("{}||index", self.workflow_name)
  }

  pub async fn save(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
    let key = self.key(&state.instance_id);
    let value = serde_json::to_vec(state).map_err(|source| WorkflowError::CorruptCheckpoint {
      key: key.clone(),
      source,
    })?;
    self.store.put(&key, Bytes::from(value)).await?;
    debug!(key = %key, status = ?state.status, steps = state.history.len(), "checkpoint_saved");
    Ok(())
  }

  pub async fn load(&self, instance_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
    let key = self.key(instance_id);
    let Some(entry) = self.store.get(&key).await? else {
      return Ok(None);
    };
    serde_json::from_slice(&entry.value)
      .map(Some)
      .map_err(|source| WorkflowError::CorruptCheckpoint { key, source })
  }

  /// Add an instance id to the index.
  pub async fn register(&self, instance_id: &str) -> Result<(), WorkflowError> {
    self
      .update_index(|ids| {
        if ids.iter().any(|id| id == instance_id) {
          return false;
        }
        ids.push(instance_id.to_string());
        true
      })
      .await
  }

  /// Drop an instance id from the index once it has reached a terminal
  /// status.
  pub async fn unregister(&self, instance_id: &str) -> Result<(), WorkflowError> {
    self
      .update_index(|ids| {
        let before = ids.len();
        ids.retain(|id| id != instance_id);
        ids.len() != before
      })
      .await
  }

  /// Read-modify-write of the index, retried from a fresh read on version
  /// conflicts. `apply` returns false when there is nothing to write.
  async fn update_index<F>(&self, mut apply: F) -> Result<(), WorkflowError>
  where
    F: FnMut(&mut Vec<String>) -> bool,
  {
    let key = self.index_key();
    let mut attempt = 0;
    loop {
      attempt += 1;

      let (mut ids, condition) = match self.store.get(&key).await? {
        Some(entry) => (
          decode_index(&key, &entry.value)?,
          SaveCondition::Matches(entry.version),
        ),
        None => (Vec::new(), SaveCondition::Absent),
      };
      if !apply(&mut ids) {
        return Ok(());
      }

      let value = serde_json::to_vec(&ids).map_err(|source| WorkflowError::CorruptCheckpoint {
        key: key.clone(),
        source,
      })?;
      match self.store.save(&key, Bytes::from(value), condition).await {
        Ok(_) => {
          debug!(key = %key, indexed = ids.len(), "index updated");
          return Ok(());
        }
        Err(e) if e.is_conflict() && attempt < INDEX_MAX_ATTEMPTS => {
          tokio::task::yield_now().await;
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Ids of instances not yet known to be finished, in registration order.
  pub async fn list(&self) -> Result<Vec<String>, WorkflowError> {
    let key = self.index_key();
    match self.store.get(&key).await? {
      Some(entry) => decode_index(&key, &entry.value),
      None => Ok(Vec::new()),
    }
  }
}

fn decode_index(key: &str, value: &[u8]) -> Result<Vec<String>, WorkflowError> {
  serde_json::from_slice(value).map_err(|source| WorkflowError::CorruptCheckpoint {
    key: key.to_string(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::{ScanPayload, WorkflowStatus};
  use scanflow_host_kv::InMemoryKvStore;

  fn checkpoints() -> (Arc<InMemoryKvStore>, CheckpointStore) {
    let store = Arc::new(InMemoryKvStore::new(1024 * 1024));
    let checkpoints = CheckpointStore::new(store.clone(), "ContainerScanWorkflow");
    (store, checkpoints)
  }

  #[tokio::test]
  async fn test_save_and_load() {
    let (store, checkpoints) = checkpoints();
    let state = WorkflowState::new("abc", "ContainerScanWorkflow", ScanPayload::new("nginx"));

    checkpoints.save(&state).await.unwrap();

    let loaded = checkpoints.load("abc").await.unwrap().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.status, WorkflowStatus::Pending);
    assert!(store.get("ContainerScanWorkflow||abc").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_load_missing() {
    let (_, checkpoints) = checkpoints();
    assert!(checkpoints.load("nope").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_load_corrupt() {
    let (store, checkpoints) = checkpoints();
    store
      .put("ContainerScanWorkflow||abc", Bytes::from_static(b"not json"))
      .await
      .unwrap();

    let err = checkpoints.load("abc").await.unwrap_err();
    assert!(matches!(err, WorkflowError::CorruptCheckpoint { .. }));
  }

  #[tokio::test]
  async fn test_register_is_idempotent() {
    let (_, checkpoints) = checkpoints();
    checkpoints.register("a").await.unwrap();
    checkpoints.register("b").await.unwrap();
    checkpoints.register("a").await.unwrap();

    assert_eq!(checkpoints.list().await.unwrap(), vec!["a", "b"]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_register_loses_nothing() {
    let (_, checkpoints) = checkpoints();
    let tasks: Vec<_> = (0..10)
      .map(|i| {
        let checkpoints = checkpoints.clone();
        tokio::spawn(async move { checkpoints.register(&format!("id-{i}")).await })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    let mut ids = checkpoints.list().await.unwrap();
    ids.sort();
    assert_eq!(ids.len(), 10);
  }

  #[tokio::test]
  async fn test_unregister_shrinks_index() {
    let (store, checkpoints) = checkpoints();
    checkpoints.register("a").await.unwrap();
    checkpoints.register("b").await.unwrap();
    checkpoints.register("c").await.unwrap();
    let full = store.get("ContainerScanWorkflow||index").await.unwrap().unwrap();

    checkpoints.unregister("b").await.unwrap();
    checkpoints.unregister("missing").await.unwrap();
    assert_eq!(checkpoints.list().await.unwrap(), vec!["a", "c"]);

    checkpoints.unregister("a").await.unwrap();
    checkpoints.unregister("c").await.unwrap();
    assert!(checkpoints.list().await.unwrap().is_empty());
    let empty = store.get("ContainerScanWorkflow||index").await.unwrap().unwrap();
    assert!(empty.value.len() < full.value.len());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_register_and_unregister() {
    let (_, checkpoints) = checkpoints();
    for i in 0..6 {
      checkpoints.register(&format!("old-{i}")).await.unwrap();
    }

    let tasks: Vec<_> = (0..6)
      .map(|i| {
        let checkpoints = checkpoints.clone();
        tokio::spawn(async move {
          checkpoints.unregister(&format!("old-{i}")).await?;
          checkpoints.register(&format!("new-{i}")).await
        })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    let ids = checkpoints.list().await.unwrap();
    assert_eq!(ids.len(), 6);
    assert!(ids.iter().all(|id| id.starts_with("new-")));
  }
}
