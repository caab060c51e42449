use std::sync::Arc;

use bytes::Bytes;
use scanflow_host_kv::{KvStore, SaveCondition, Version};
use tracing::{debug, info, instrument, warn};

use crate::error::LedgerError;
use crate::types::{InventoryItem, InventoryResult};

/// Verify/update operations over inventory records in a [`KvStore`].
#[derive(Clone)]
pub struct Ledger {
  store: Arc<dyn KvStore>,
  max_attempts: u32,
}

impl Ledger {
  /// `max_attempts` bounds how many conflicting writes an update tolerates
  /// before reporting the conflict.
  pub fn new(store: Arc<dyn KvStore>, max_attempts: u32) -> Self {
    Self {
      store,
      max_attempts: max_attempts.max(1),
    }
  }

  /// Current record for `item_name`, if any.
  pub async fn item(&self, item_name: &str) -> Result<Option<InventoryItem>, LedgerError> {
    Ok(self.read(item_name).await?.map(|(item, _)| item))
  }

  /// Check whether `requested` units of `item_name` are in stock.
  ///
  /// An unknown item is reported as `success = false`, not as an error.
  #[instrument(name = "ledger_verify", skip(self))]
  pub async fn verify(
    &self,
    item_name: &str,
    requested: u64,
  ) -> Result<InventoryResult, LedgerError> {
    let Some((item, _)) = self.read(item_name).await? else {
      info!("item not stocked");
      return Ok(InventoryResult::unavailable());
    };

    info!(available = item.quantity, "inventory checked");
    if requested <= item.quantity {
      Ok(InventoryResult::found(item))
    } else {
      Ok(InventoryResult::unavailable())
    }
  }

  /// Remove `purchase` units of `item_name` from stock.
  ///
  /// The write only lands if the record is unchanged since it was read; on a
  /// conflict the whole read-compute-write is retried from a fresh read. A
  /// purchase larger than the stock fails with
  /// [`LedgerError::InsufficientInventory`] and writes nothing.
  #[instrument(name = "ledger_update", skip(self))]
  pub async fn update(&self, item_name: &str, purchase: u64) -> Result<InventoryItem, LedgerError> {
    let mut attempt = 0;
    loop {
      attempt += 1;

      let (mut item, version) =
        self
          .read(item_name)
          .await?
          .ok_or_else(|| LedgerError::NotFound {
            item: item_name.to_string(),
          })?;

      let Some(remaining) = item.quantity.checked_sub(purchase) else {
        warn!(available = item.quantity, "insufficient inventory");
        return Err(LedgerError::InsufficientInventory {
          item: item_name.to_string(),
          requested: purchase,
          available: item.quantity,
        });
      };
      item.quantity = remaining;

      let value = encode(&item)?;
      match self
        .store
        .save(item_name, value, SaveCondition::Matches(version))
        .await
      {
        Ok(_) => {
          info!(remaining, attempt, "inventory updated");
          return Ok(item);
        }
        Err(e) if e.is_conflict() && attempt < self.max_attempts => {
          debug!(attempt, "concurrent update detected, retrying");
          tokio::task::yield_now().await;
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Write base stock, replacing whatever records exist for these items.
  pub async fn restock(&self, items: &[InventoryItem]) -> Result<(), LedgerError> {
    for item in items {
      self.store.put(&item.item_name, encode(item)?).await?;
      info!(item = %item.item_name, quantity = item.quantity, "base stock written");
    }
    Ok(())
  }

  async fn read(&self, item_name: &str) -> Result<Option<(InventoryItem, Version)>, LedgerError> {
    let Some(entry) = self.store.get(item_name).await? else {
      return Ok(None);
    };
    let item = serde_json::from_slice(&entry.value).map_err(|source| LedgerError::Codec {
      item: item_name.to_string(),
      source,
    })?;
    Ok(Some((item, entry.version)))
  }
}

fn encode(item: &InventoryItem) -> Result<Bytes, LedgerError> {
  serde_json::to_vec(item)
    .map(Bytes::from)
    .map_err(|source| LedgerError::Codec {
      item: item.item_name.clone(),
      source,
    })
}

#[cfg(test)]
mod tests {
  use scanflow_host_kv::InMemoryKvStore;

  use super::*;

  fn widget(quantity: u64) -> InventoryItem {
    InventoryItem {
      item_name: "widget".to_string(),
      per_item_cost: 25,
      quantity,
    }
  }

  async fn ledger_with(items: &[InventoryItem]) -> Ledger {
    let ledger = Ledger::new(Arc::new(InMemoryKvStore::new(4096)), 8);
    ledger.restock(items).await.unwrap();
    ledger
  }

  #[tokio::test]
  async fn test_verify_succeeds_iff_requested_within_stock() {
    for available in [0u64, 1, 5] {
      let ledger = ledger_with(&[widget(available)]).await;
      for requested in 0..=6u64 {
        let result = ledger.verify("widget", requested).await.unwrap();
        assert_eq!(
          result.success,
          requested <= available,
          "available {available}, requested {requested}"
        );
        if result.success {
          assert_eq!(result.inventory_item, widget(available));
        } else {
          assert_eq!(result.inventory_item, InventoryItem::default());
        }
      }
    }
  }

  #[tokio::test]
  async fn test_verify_unknown_item_is_not_an_error() {
    let ledger = ledger_with(&[]).await;
    let result = ledger.verify("gadget", 1).await.unwrap();
    assert!(!result.success);
  }

  #[tokio::test]
  async fn test_update_decrements_and_persists() {
    let ledger = ledger_with(&[widget(5)]).await;

    let updated = ledger.update("widget", 3).await.unwrap();
    assert_eq!(updated.quantity, 2);
    assert_eq!(ledger.item("widget").await.unwrap(), Some(widget(2)));

    let drained = ledger.update("widget", 2).await.unwrap();
    assert_eq!(drained.quantity, 0);
  }

  #[tokio::test]
  async fn test_update_beyond_stock_leaves_record_untouched() {
    let ledger = ledger_with(&[widget(5)]).await;

    let err = ledger.update("widget", 7).await.unwrap_err();
    assert!(matches!(
      err,
      LedgerError::InsufficientInventory {
        requested: 7,
        available: 5,
        ..
      }
    ));
    assert_eq!(ledger.item("widget").await.unwrap(), Some(widget(5)));
  }

  #[tokio::test]
  async fn test_update_unknown_item() {
    let ledger = ledger_with(&[]).await;
    let err = ledger.update("gadget", 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
  }

  #[tokio::test]
  async fn test_corrupt_record() {
    let store = Arc::new(InMemoryKvStore::new(4096));
    store
      .put("widget", Bytes::from_static(b"not json"))
      .await
      .unwrap();
    let ledger = Ledger::new(store, 8);

    assert!(matches!(
      ledger.verify("widget", 1).await,
      Err(LedgerError::Codec { .. })
    ));
  }
}
