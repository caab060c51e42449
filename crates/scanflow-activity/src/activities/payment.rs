use async_trait::async_trait;
use tracing::info;

use crate::activity::{Activity, ActivityContext};
use crate::error::ActivityError;
use crate::types::{ApprovalRequired, PaymentRequest};

/// Approves orders whose total cost is within the configured limit.
pub struct RequestApprovalActivity {
  limit: u64,
}

impl RequestApprovalActivity {
  pub fn new(limit: u64) -> Self {
    Self { limit }
  }
}

#[async_trait]
impl Activity for RequestApprovalActivity {
  const NAME: &'static str = "RequestApprovalActivity";
  type Input = PaymentRequest;
  type Output = ApprovalRequired;

  async fn run(
    &self,
    ctx: &ActivityContext,
    input: PaymentRequest,
  ) -> Result<ApprovalRequired, ActivityError> {
    let approval = input.amount <= self.limit;
    info!(
      instance_id = %ctx.instance_id,
      amount = input.amount,
      limit = self.limit,
      approval,
      "approval_decided"
    );
    Ok(ApprovalRequired { approval })
  }
}

/// Records a payment. No funds actually move.
pub struct ProcessPaymentActivity;

#[async_trait]
impl Activity for ProcessPaymentActivity {
  const NAME: &'static str = "ProcessPaymentActivity";
  type Input = PaymentRequest;
  type Output = ();

  async fn run(&self, ctx: &ActivityContext, input: PaymentRequest) -> Result<(), ActivityError> {
    info!(
      instance_id = %ctx.instance_id,
      request_id = %input.request_id,
      item = %input.item_being_purchased,
      amount = input.amount,
      quantity = input.quantity,
      "payment_processed"
    );
    Ok(())
  }
}

/// Undo step for [`ProcessPaymentActivity`].
pub struct RefundPaymentActivity;

#[async_trait]
impl Activity for RefundPaymentActivity {
  const NAME: &'static str = "RefundPaymentActivity";
  type Input = PaymentRequest;
  type Output = ();

  async fn run(&self, ctx: &ActivityContext, input: PaymentRequest) -> Result<(), ActivityError> {
    info!(
      instance_id = %ctx.instance_id,
      request_id = %input.request_id,
      amount = input.amount,
      "payment_refunded"
    );
    Ok(())
  }
}
