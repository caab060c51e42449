use scanflow_host_kv::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
  /// The purchase would drive the stored quantity negative. Nothing was written.
  #[error("insufficient inventory for '{item}': requested {requested}, available {available}")]
  InsufficientInventory {
    item: String,
    requested: u64,
    available: u64,
  },

  #[error("item '{item}' not found")]
  NotFound { item: String },

  #[error("invalid inventory record for '{item}': {source}")]
  Codec {
    item: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("state store error: {0}")]
  Store(#[from] StoreError),
}
