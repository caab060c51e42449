use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::activity::ActivityContext;
use crate::error::ActivityError;
use crate::registry::ActivityRegistry;

/// Runs activities by name against a registry.
///
/// Each call is attempted exactly once. When a timeout is configured the
/// call is dropped once it elapses and reported as
/// [`ActivityError::Timeout`].
#[derive(Debug, Clone)]
pub struct ActivityExecutor {
  registry: Arc<ActivityRegistry>,
  timeout: Option<Duration>,
}

impl ActivityExecutor {
  pub fn new(registry: ActivityRegistry) -> Self {
    Self {
      registry: Arc::new(registry),
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn registry(&self) -> &ActivityRegistry {
    &self.registry
  }

  /// Execute an activity on untyped JSON.
  #[instrument(
    name = "activity_execute",
    skip_all,
    fields(instance_id = %ctx.instance_id, step = ctx.step, activity = %name)
  )]
  pub async fn execute(
    &self,
    ctx: &ActivityContext,
    name: &str,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, ActivityError> {
    let handler = self
      .registry
      .get(name)
      .ok_or_else(|| ActivityError::NotRegistered {
        name: name.to_string(),
      })?;

    info!("activity started");
    let start = Instant::now();

    let call = handler.invoke(ctx, input);
    let result = match self.timeout {
      Some(timeout) => match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ActivityError::Timeout {
          activity: name.to_string(),
          timeout_ms: timeout.as_millis() as u64,
        }),
      },
      None => call.await,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
      Ok(_) => info!(duration_ms, "activity completed"),
      Err(e) => warn!(duration_ms, error = %e, "activity failed"),
    }

    result
  }

  /// Execute an activity with typed envelopes on both sides.
  pub async fn call<I, O>(&self, ctx: &ActivityContext, name: &str, input: &I) -> Result<O, ActivityError>
  where
    I: Serialize + Sync,
    O: DeserializeOwned,
  {
    let input = serde_json::to_value(input).map_err(|e| ActivityError::InvalidInput {
      activity: name.to_string(),
      message: e.to_string(),
    })?;

    let output = self.execute(ctx, name, input).await?;

    serde_json::from_value(output).map_err(|e| ActivityError::InvalidOutput {
      activity: name.to_string(),
      message: e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::activity::Activity;
  use async_trait::async_trait;

  struct Echo;

  #[async_trait]
  impl Activity for Echo {
    const NAME: &'static str = "Echo";
    type Input = String;
    type Output = String;

    async fn run(&self, ctx: &ActivityContext, input: String) -> Result<String, ActivityError> {
      Ok(format!("{}:{}", ctx.instance_id, input))
    }
  }

  struct Sleepy;

  #[async_trait]
  impl Activity for Sleepy {
    const NAME: &'static str = "Sleepy";
    type Input = ();
    type Output = ();

    async fn run(&self, _ctx: &ActivityContext, _input: ()) -> Result<(), ActivityError> {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok(())
    }
  }

  fn executor() -> ActivityExecutor {
    let mut registry = ActivityRegistry::new();
    registry.register(Echo).register(Sleepy);
    ActivityExecutor::new(registry)
  }

  #[tokio::test]
  async fn test_call_typed() {
    let ctx = ActivityContext::new("abc", 0);
    let out: String = executor().call(&ctx, "Echo", &"hello").await.unwrap();
    assert_eq!(out, "abc:hello");
  }

  #[tokio::test]
  async fn test_unknown_activity() {
    let ctx = ActivityContext::new("abc", 0);
    let err = executor()
      .execute(&ctx, "Missing", serde_json::Value::Null)
      .await
      .unwrap_err();
    assert!(matches!(err, ActivityError::NotRegistered { name } if name == "Missing"));
  }

  #[tokio::test]
  async fn test_invalid_input() {
    let ctx = ActivityContext::new("abc", 0);
    let err = executor()
      .execute(&ctx, "Echo", serde_json::json!({ "not": "a string" }))
      .await
      .unwrap_err();
    assert!(matches!(err, ActivityError::InvalidInput { activity, .. } if activity == "Echo"));
  }

  #[tokio::test]
  async fn test_timeout() {
    let ctx = ActivityContext::new("abc", 1);
    let executor = executor().with_timeout(Some(Duration::from_millis(20)));
    let err = executor
      .execute(&ctx, "Sleepy", serde_json::Value::Null)
      .await
      .unwrap_err();
    assert!(matches!(err, ActivityError::Timeout { timeout_ms: 20, .. }));
  }

  #[test]
  fn test_registry_names_sorted() {
    let executor = executor();
    assert_eq!(executor.registry().names(), vec!["Echo", "Sleepy"]);
  }
}
