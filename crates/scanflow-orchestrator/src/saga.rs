//! One instance's walk through the saga.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use scanflow_activity::activities::{
  ContainerScanActivity, NotifyActivity, ProcessPaymentActivity, RefundPaymentActivity,
  RequestApprovalActivity, StageSbomActivity, UpdateInventoryActivity, VerifyInventoryActivity,
};
use scanflow_activity::{
  Activity, ActivityContext, ActivityError, ActivityExecutor, ApprovalRequired, InventoryRequest,
  InventoryResult, Notification, PaymentRequest, SbomRequest, ScanOutcome, ScanRequest,
  StagedSbom,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::WorkflowError;
use crate::state::{Order, StepRecord, WorkflowState, WorkflowStatus};
use crate::template::render_notification;

/// Behaviour shared by every instance of an orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct SagaSettings {
  pub notify_template: String,
  pub compensate_on_failure: bool,
}

/// An undo step queued by a completed activity.
struct Compensation {
  activity: &'static str,
  input: serde_json::Value,
}

pub(crate) struct Saga {
  state: WorkflowState,
  executor: Arc<ActivityExecutor>,
  checkpoints: CheckpointStore,
  settings: Arc<SagaSettings>,
  cancel: CancellationToken,
  cursor: usize,
  staged: Option<PathBuf>,
  scan: Option<ScanOutcome>,
  compensations: Vec<Compensation>,
}

impl Saga {
  pub(crate) fn new(
    state: WorkflowState,
    executor: Arc<ActivityExecutor>,
    checkpoints: CheckpointStore,
    settings: Arc<SagaSettings>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      state,
      executor,
      checkpoints,
      settings,
      cancel,
      cursor: 0,
      staged: None,
      scan: None,
      compensations: Vec::new(),
    }
  }

  /// Drive the instance to a terminal state and persist it.
  #[instrument(
    name = "workflow_run",
    skip_all,
    fields(instance_id = %self.state.instance_id, workflow_name = %self.state.workflow_name)
  )]
  pub(crate) async fn run(mut self) -> WorkflowState {
    info!(
      replayed_steps = self.state.history.len(),
      target = %self.state.input.target,
      "workflow_started"
    );

    let outcome = self.drive().await;
    self.finalize(outcome).await;
    self.state
  }

  async fn drive(&mut self) -> Result<ScanOutcome, WorkflowError> {
    let instance_id = self.state.instance_id.clone();
    let input = self.state.input.clone();

    let message = render_notification(&self.settings.notify_template, &instance_id, &input.target)?;
    self
      .call::<_, ()>(NotifyActivity::NAME, &Notification { message })
      .await?;

    let staged: StagedSbom = self
      .call(
        StageSbomActivity::NAME,
        &SbomRequest {
          request_id: instance_id.clone(),
          target: input.target.clone(),
        },
      )
      .await?;
    self.staged = Some(staged.path.clone());

    let scan: ScanOutcome = self
      .call(
        ContainerScanActivity::NAME,
        &ScanRequest {
          request_id: instance_id.clone(),
          target: staged.path.display().to_string(),
          output_format: input.output_format.clone(),
        },
      )
      .await?;
    self.scan = Some(scan.clone());

    if let Some(order) = &input.order {
      self.fulfill(&instance_id, order).await?;
    }

    Ok(scan)
  }

  async fn fulfill(&mut self, instance_id: &str, order: &Order) -> Result<(), WorkflowError> {
    let verified: InventoryResult = self
      .call(
        VerifyInventoryActivity::NAME,
        &InventoryRequest {
          request_id: instance_id.to_string(),
          item_name: order.item_name.clone(),
          quantity: order.quantity,
        },
      )
      .await?;
    if !verified.success {
      return Err(WorkflowError::rejected(format!(
        "insufficient inventory for '{}'",
        order.item_name
      )));
    }

    let payment = PaymentRequest {
      request_id: instance_id.to_string(),
      item_being_purchased: order.item_name.clone(),
      amount: order
        .quantity
        .saturating_mul(verified.inventory_item.per_item_cost),
      quantity: order.quantity,
    };

    let approval: ApprovalRequired = self.call(RequestApprovalActivity::NAME, &payment).await?;
    if !approval.approval {
      return Err(WorkflowError::rejected(format!(
        "order not approved: amount {} exceeds the approval limit",
        payment.amount
      )));
    }

    self
      .call::<_, ()>(ProcessPaymentActivity::NAME, &payment)
      .await?;
    self.compensations.push(Compensation {
      activity: RefundPaymentActivity::NAME,
      input: encode_input(RefundPaymentActivity::NAME, &payment)?,
    });

    self
      .call::<_, InventoryResult>(UpdateInventoryActivity::NAME, &payment)
      .await?;
    Ok(())
  }

  /// Dispatch the next step, or replay it from history when it already ran.
  async fn call<I, O>(&mut self, activity: &str, input: &I) -> Result<O, WorkflowError>
  where
    I: Serialize + Sync,
    O: DeserializeOwned,
  {
    if self.cancel.is_cancelled() {
      return Err(WorkflowError::Terminated);
    }

    let step = self.cursor;
    let output = match self.state.history.get(step) {
      Some(record) if record.activity == activity => {
        debug!(step, activity, "step_replayed");
        record.output.clone()
      }
      Some(record) => {
        return Err(WorkflowError::NonDeterministic {
          step,
          expected: activity.to_string(),
          recorded: record.activity.clone(),
        });
      }
      None => {
        if self.state.status == WorkflowStatus::Pending {
          self.state.transition(WorkflowStatus::Running);
          self.checkpoints.save(&self.state).await?;
        }

        let ctx = ActivityContext::new(self.state.instance_id.clone(), step);
        let input = encode_input(activity, input)?;
        let output = self
          .executor
          .execute(&ctx, activity, input)
          .await
          .map_err(|source| WorkflowError::Activity {
            activity: activity.to_string(),
            source,
          })?;

        self.state.history.push(StepRecord {
          activity: activity.to_string(),
          output: output.clone(),
        });
        self.state.updated_at = chrono::Utc::now();
        self.checkpoints.save(&self.state).await?;
        output
      }
    };
    self.cursor += 1;

    serde_json::from_value(output).map_err(|e| WorkflowError::Activity {
      activity: activity.to_string(),
      source: ActivityError::InvalidOutput {
        activity: activity.to_string(),
        message: e.to_string(),
      },
    })
  }

  async fn finalize(&mut self, outcome: Result<ScanOutcome, WorkflowError>) {
    match outcome {
      Ok(result) => {
        self.state.result = Some(result);
        self.state.error = None;
        self.state.transition(WorkflowStatus::Completed);
        info!(steps = self.state.history.len(), "workflow_completed");
      }
      Err(WorkflowError::Terminated) => {
        let report = self.scan.take().and_then(|scan| scan.report);
        self.state.result = Some(ScanOutcome::failed(report));
        self.state.error = Some(WorkflowError::Terminated.to_string());
        self.state.transition(WorkflowStatus::Terminated);
        warn!(steps = self.state.history.len(), "workflow_terminated");
      }
      Err(e) => {
        let report = e
          .scan_report()
          .cloned()
          .or_else(|| self.scan.take().and_then(|scan| scan.report));

        if self.settings.compensate_on_failure {
          self.compensate().await;
        }

        self.state.result = Some(ScanOutcome::failed(report));
        self.state.error = Some(e.to_string());
        self.state.transition(WorkflowStatus::Failed);
        error!(error = %e, "workflow_failed");
      }
    }

    if let Err(e) = self.checkpoints.save(&self.state).await {
      error!(error = %e, status = ?self.state.status, "checkpoint_save_failed");
      if let Err(e) = self.save_reduced(e).await {
        error!(error = %e, "reduced checkpoint save failed");
        return;
      }
    }

    self.discard_staged().await;
    if let Err(e) = self.checkpoints.unregister(&self.state.instance_id).await {
      warn!(error = %e, "failed to drop instance from index");
    }
  }

  /// Persist a `Failed` state without recorded outputs or report, for when
  /// the full terminal state cannot be written.
  async fn save_reduced(&mut self, cause: WorkflowError) -> Result<(), WorkflowError> {
    for record in &mut self.state.history {
      record.output = serde_json::Value::Null;
    }
    self.state.result = Some(ScanOutcome::failed(None));
    self.state.error = Some(format!("failed to checkpoint final state: {cause}"));
    self.state.transition(WorkflowStatus::Failed);
    self.checkpoints.save(&self.state).await
  }

  /// Remove the SBOM file handed to the scanner.
  async fn discard_staged(&mut self) {
    let Some(path) = self.staged.take() else {
      return;
    };
    match tokio::fs::remove_file(&path).await {
      Ok(()) => debug!(path = %path.display(), "staged sbom removed"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged sbom"),
    }
  }

  /// Run queued undo steps, newest first. Failures are logged and skipped.
  async fn compensate(&mut self) {
    while let Some(compensation) = self.compensations.pop() {
      let ctx = ActivityContext::new(self.state.instance_id.clone(), self.cursor);
      self.cursor += 1;
      match self
        .executor
        .execute(&ctx, compensation.activity, compensation.input)
        .await
      {
        Ok(_) => info!(activity = compensation.activity, "compensation_completed"),
        Err(e) => error!(
          activity = compensation.activity,
          error = %e,
          "compensation_failed"
        ),
      }
    }
  }
}

fn encode_input<I: Serialize + ?Sized>(
  activity: &str,
  input: &I,
) -> Result<serde_json::Value, WorkflowError> {
  serde_json::to_value(input).map_err(|e| WorkflowError::Activity {
    activity: activity.to_string(),
    source: ActivityError::InvalidInput {
      activity: activity.to_string(),
      message: e.to_string(),
    },
  })
}
