//! The activity abstraction.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ActivityError;

/// Per-call context handed to an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
  /// Workflow instance the call belongs to.
  pub instance_id: String,
  /// Position of the call in the instance's history.
  pub step: usize,
}

impl ActivityContext {
  pub fn new(instance_id: impl Into<String>, step: usize) -> Self {
    Self {
      instance_id: instance_id.into(),
      step,
    }
  }
}

/// A typed saga step.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
  /// Name the orchestrator dispatches on.
  const NAME: &'static str;

  type Input: DeserializeOwned + Send;
  type Output: Serialize + Send;

  async fn run(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output, ActivityError>;
}

/// Type-erased activity handler operating on JSON values.
///
/// Every [`Activity`] is wrapped into one of these at registration; it can
/// also be implemented directly for handlers whose shape is only known at
/// runtime.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
  async fn invoke(
    &self,
    ctx: &ActivityContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, ActivityError>;
}

/// Adapter that decodes input and encodes output around a typed activity.
pub(crate) struct Typed<A>(pub(crate) A);

#[async_trait]
impl<A: Activity> ActivityHandler for Typed<A> {
  async fn invoke(
    &self,
    ctx: &ActivityContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, ActivityError> {
    let input: A::Input =
      serde_json::from_value(input).map_err(|e| ActivityError::InvalidInput {
        activity: A::NAME.to_string(),
        message: e.to_string(),
      })?;

    let output = self.0.run(ctx, input).await?;

    serde_json::to_value(output).map_err(|e| ActivityError::InvalidOutput {
      activity: A::NAME.to_string(),
      message: e.to_string(),
    })
  }
}
