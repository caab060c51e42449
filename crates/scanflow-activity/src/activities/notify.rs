use async_trait::async_trait;
use tracing::info;

use crate::activity::{Activity, ActivityContext};
use crate::error::ActivityError;
use crate::types::Notification;

/// Emits the notification message as a log line.
pub struct NotifyActivity;

#[async_trait]
impl Activity for NotifyActivity {
  const NAME: &'static str = "NotifyActivity";
  type Input = Notification;
  type Output = ();

  async fn run(&self, ctx: &ActivityContext, input: Notification) -> Result<(), ActivityError> {
    info!(instance_id = %ctx.instance_id, "{}", input.message);
    Ok(())
  }
}
