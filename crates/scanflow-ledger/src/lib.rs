//! Scanflow Ledger
//!
//! Inventory records are the one piece of state that many workflow instances
//! mutate concurrently. Each [`InventoryItem`] is stored as JSON under its
//! item name. [`Ledger::update`] performs its read-modify-write as a
//! compare-and-swap on the entry's version, so two purchases of the same
//! item can never both be applied against the same stock level.

mod error;
mod ledger;
mod types;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use types::{InventoryItem, InventoryResult};
