use serde::{Deserialize, Serialize};

/// A stocked item as stored in the state store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
  pub item_name: String,
  pub per_item_cost: u64,
  pub quantity: u64,
}

/// Outcome of an inventory check or update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResult {
  pub success: bool,
  /// Snapshot of the record; default-valued when `success` is false.
  pub inventory_item: InventoryItem,
}

impl InventoryResult {
  pub fn found(item: InventoryItem) -> Self {
    Self {
      success: true,
      inventory_item: item,
    }
  }

  pub fn unavailable() -> Self {
    Self::default()
  }
}
