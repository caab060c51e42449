use async_trait::async_trait;
use scanflow_ledger::{InventoryResult, Ledger};

use crate::activity::{Activity, ActivityContext};
use crate::error::ActivityError;
use crate::types::{InventoryRequest, PaymentRequest};

/// Reports whether the requested quantity is in stock. Read only.
pub struct VerifyInventoryActivity {
  ledger: Ledger,
}

impl VerifyInventoryActivity {
  pub fn new(ledger: Ledger) -> Self {
    Self { ledger }
  }
}

#[async_trait]
impl Activity for VerifyInventoryActivity {
  const NAME: &'static str = "VerifyInventoryActivity";
  type Input = InventoryRequest;
  type Output = InventoryResult;

  async fn run(
    &self,
    _ctx: &ActivityContext,
    input: InventoryRequest,
  ) -> Result<InventoryResult, ActivityError> {
    Ok(self.ledger.verify(&input.item_name, input.quantity).await?)
  }
}

/// Debits the purchased quantity from stock.
pub struct UpdateInventoryActivity {
  ledger: Ledger,
}

impl UpdateInventoryActivity {
  pub fn new(ledger: Ledger) -> Self {
    Self { ledger }
  }
}

#[async_trait]
impl Activity for UpdateInventoryActivity {
  const NAME: &'static str = "UpdateInventoryActivity";
  type Input = PaymentRequest;
  type Output = InventoryResult;

  async fn run(
    &self,
    _ctx: &ActivityContext,
    input: PaymentRequest,
  ) -> Result<InventoryResult, ActivityError> {
    let item = self
      .ledger
      .update(&input.item_being_purchased, input.quantity)
      .await?;
    Ok(InventoryResult::found(item))
  }
}
