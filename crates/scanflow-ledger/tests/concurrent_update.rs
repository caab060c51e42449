//! Concurrent purchases against the same inventory record.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use scanflow_host_kv::{Entry, InMemoryKvStore, KvStore, SaveCondition, StoreError, Version};
use scanflow_ledger::{InventoryItem, Ledger, LedgerError};
use tokio::sync::Barrier;

fn stock(item_name: &str, quantity: u64) -> InventoryItem {
  InventoryItem {
    item_name: item_name.to_string(),
    per_item_cost: 10,
    quantity,
  }
}

async fn stocked_ledger(quantity: u64) -> Ledger {
  let ledger = Ledger::new(Arc::new(InMemoryKvStore::new(4096)), 64);
  ledger.restock(&[stock("widget", quantity)]).await.unwrap();
  ledger
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_purchases_exceeding_stock_do_not_both_succeed() {
  for _ in 0..50 {
    let ledger = stocked_ledger(5).await;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [3u64, 4]
      .into_iter()
      .map(|qty| {
        let ledger = ledger.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
          barrier.wait().await;
          (qty, ledger.update("widget", qty).await)
        })
      })
      .collect();

    let results = futures::future::join_all(handles).await;
    let winners: Vec<u64> = results
      .iter()
      .filter_map(|r| match r.as_ref().unwrap() {
        (qty, Ok(_)) => Some(*qty),
        (_, Err(LedgerError::InsufficientInventory { .. })) => None,
        (_, Err(e)) => panic!("unexpected error: {e}"),
      })
      .collect();

    assert_eq!(winners.len(), 1, "exactly one purchase may win");
    let remaining = ledger.item("widget").await.unwrap().unwrap().quantity;
    assert_eq!(remaining, 5 - winners[0]);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_single_unit_purchases_never_oversell() {
  let ledger = stocked_ledger(7).await;
  let barrier = Arc::new(Barrier::new(20));

  let handles: Vec<_> = (0..20)
    .map(|_| {
      let ledger = ledger.clone();
      let barrier = barrier.clone();
      tokio::spawn(async move {
        barrier.wait().await;
        ledger.update("widget", 1).await
      })
    })
    .collect();

  let mut succeeded = 0;
  for result in futures::future::join_all(handles).await {
    match result.unwrap() {
      Ok(_) => succeeded += 1,
      Err(LedgerError::InsufficientInventory { .. }) => {}
      Err(e) => panic!("unexpected error: {e}"),
    }
  }

  assert_eq!(succeeded, 7);
  assert_eq!(ledger.item("widget").await.unwrap().unwrap().quantity, 0);
}

/// Store wrapper that lets another "writer" sneak in before conditional saves.
struct InterferingStore {
  inner: InMemoryKvStore,
  interruptions_left: AtomicU32,
}

impl InterferingStore {
  fn new(interruptions: u32) -> Self {
    Self {
      inner: InMemoryKvStore::new(4096),
      interruptions_left: AtomicU32::new(interruptions),
    }
  }
}

#[async_trait]
impl KvStore for InterferingStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
    self.inner.get(key).await
  }

  async fn save(
    &self,
    key: &str,
    value: Bytes,
    condition: SaveCondition,
  ) -> Result<Version, StoreError> {
    if matches!(condition, SaveCondition::Matches(_))
      && self
        .interruptions_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
      // another writer takes one unit first
      let current = self.inner.get(key).await?.unwrap();
      let mut item: InventoryItem = serde_json::from_slice(&current.value).unwrap();
      item.quantity -= 1;
      self
        .inner
        .put(key, Bytes::from(serde_json::to_vec(&item).unwrap()))
        .await?;
    }
    self.inner.save(key, value, condition).await
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.inner.delete(key).await
  }

  fn max_value_bytes(&self) -> usize {
    self.inner.max_value_bytes()
  }
}

#[tokio::test]
async fn test_conflict_retries_from_fresh_read() {
  let store = Arc::new(InterferingStore::new(2));
  let ledger = Ledger::new(store, 8);
  ledger.restock(&[stock("widget", 10)]).await.unwrap();

  // two interleaved writers each take one unit before our write lands
  let updated = ledger.update("widget", 3).await.unwrap();
  assert_eq!(updated.quantity, 5);
  assert_eq!(ledger.item("widget").await.unwrap().unwrap().quantity, 5);
}

#[tokio::test]
async fn test_conflict_reported_after_max_attempts() {
  let store = Arc::new(InterferingStore::new(u32::MAX));
  let ledger = Ledger::new(store, 3);
  ledger.restock(&[stock("widget", 100)]).await.unwrap();

  let err = ledger.update("widget", 1).await.unwrap_err();
  assert!(matches!(err, LedgerError::Store(ref e) if e.is_conflict()));
  // only the interfering writers touched the record
  assert_eq!(ledger.item("widget").await.unwrap().unwrap().quantity, 97);
}
