//! Orchestrator loop and its control handle.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use scanflow_activity::{ActivityExecutor, ScanOutcome, ScanResult};
use scanflow_config::ServiceConfig;
use scanflow_host_kv::KvStore;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::error::WorkflowError;
use crate::saga::{Saga, SagaSettings};
use crate::state::{ScanPayload, WorkflowState, WorkflowStatus};

enum Command {
  Start {
    payload: ScanPayload,
    reply: oneshot::Sender<Result<String, WorkflowError>>,
  },
  Terminate {
    instance_id: String,
    reply: oneshot::Sender<Result<(), WorkflowError>>,
  },
}

/// What an instance task hands back to the loop.
struct InstanceExit {
  instance_id: String,
  /// `None` when the saga panicked.
  state: Option<WorkflowState>,
}

/// Owns every running workflow instance.
///
/// Commands arrive over an mpsc channel from [`OrchestratorHandle`]s and are
/// answered on oneshot channels. Instance tasks live in a [`JoinSet`] owned
/// by the loop, optionally spawned onto a separate worker runtime, and at
/// most `max_concurrent_instances` of them run activities at once.
///
/// # Usage
///
/// ```ignore
/// let orchestrator = Orchestrator::new(&config, executor, store).with_workers(workers.handle().clone());
/// let handle = orchestrator.handle();
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(orchestrator.run(cancel.clone()));
///
/// let id = handle.start(ScanPayload::new("nginx:latest")).await?;
/// ```
pub struct Orchestrator {
  sender: mpsc::Sender<Command>,
  receiver: mpsc::Receiver<Command>,
  checkpoints: CheckpointStore,
  executor: Arc<ActivityExecutor>,
  settings: Arc<SagaSettings>,
  permits: Arc<Semaphore>,
  workers: Option<Handle>,
  tasks: JoinSet<InstanceExit>,
  live: HashMap<String, CancellationToken>,
}

impl Orchestrator {
  pub fn new(config: &ServiceConfig, executor: Arc<ActivityExecutor>, store: Arc<dyn KvStore>) -> Self {
    Self::with_buffer_size(config, executor, store, 100)
  }

  pub fn with_buffer_size(
    config: &ServiceConfig,
    executor: Arc<ActivityExecutor>,
    store: Arc<dyn KvStore>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      checkpoints: CheckpointStore::new(store, config.workflow_name.clone()),
      executor,
      settings: Arc::new(SagaSettings {
        notify_template: config.notify_template.clone(),
        compensate_on_failure: config.compensate_on_failure,
      }),
      permits: Arc::new(Semaphore::new(config.max_concurrent_instances)),
      workers: None,
      tasks: JoinSet::new(),
      live: HashMap::new(),
    }
  }

  /// Spawn instance tasks onto `workers` instead of the runtime driving
  /// [`Orchestrator::run`].
  pub fn with_workers(mut self, workers: Handle) -> Self {
    self.workers = Some(workers);
    self
  }

  pub fn handle(&self) -> OrchestratorHandle {
    OrchestratorHandle {
      sender: self.sender.clone(),
      checkpoints: self.checkpoints.clone(),
    }
  }

  /// Reschedule every indexed instance that has not reached a terminal
  /// status; finished instances still in the index are dropped from it.
  /// Returns how many were resumed.
  pub async fn resume_all(&mut self) -> Result<usize, WorkflowError> {
    let mut resumed = 0;
    for instance_id in self.checkpoints.list().await? {
      if self.live.contains_key(&instance_id) {
        continue;
      }
      match self.checkpoints.load(&instance_id).await {
        Ok(Some(state)) if !state.is_done() => {
          info!(
            instance_id = %instance_id,
            status = ?state.status,
            recorded_steps = state.history.len(),
            "workflow_resumed"
          );
          self.spawn(state);
          resumed += 1;
        }
        Ok(Some(_)) => {
          // finished, but the process stopped before it left the index
          if let Err(e) = self.checkpoints.unregister(&instance_id).await {
            warn!(instance_id = %instance_id, error = %e, "failed to drop instance from index");
          }
        }
        Ok(None) => warn!(instance_id = %instance_id, "indexed instance has no checkpoint"),
        Err(e) => warn!(instance_id = %instance_id, error = %e, "skipping unreadable checkpoint"),
      }
    }
    Ok(resumed)
  }

  /// Run the command loop until `cancel` fires.
  ///
  /// Unfinished instances are resumed first. On shutdown running instances
  /// are aborted without being marked, so the next start resumes them.
  pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WorkflowError> {
    info!(workflow_name = %self.checkpoints.workflow_name(), "orchestrator_started");

    match self.resume_all().await {
      Ok(resumed) if resumed > 0 => info!(resumed, "unfinished instances rescheduled"),
      Ok(_) => {}
      Err(e) => error!(error = %e, "failed to resume unfinished instances"),
    }

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(running = self.live.len(), "orchestrator_shutdown");
          break;
        }
        command = self.receiver.recv() => {
          match command {
            Some(command) => self.handle_command(command).await,
            None => {
              info!("orchestrator command channel closed");
              break;
            }
          }
        }
        Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
          self.reap(joined).await;
        }
      }
    }

    self.tasks.abort_all();
    Ok(())
  }

  async fn handle_command(&mut self, command: Command) {
    match command {
      Command::Start { payload, reply } => {
        let result = match self.create(payload).await {
          Ok(state) => {
            let instance_id = state.instance_id.clone();
            self.spawn(state);
            Ok(instance_id)
          }
          Err(e) => Err(e),
        };
        let _ = reply.send(result);
      }
      Command::Terminate { instance_id, reply } => {
        let result = self.terminate(&instance_id).await;
        let _ = reply.send(result);
      }
    }
  }

  async fn create(&self, payload: ScanPayload) -> Result<WorkflowState, WorkflowError> {
    let instance_id = Uuid::new_v4().to_string();
    let state = WorkflowState::new(&instance_id, self.checkpoints.workflow_name(), payload);

    let creation = |e: WorkflowError| WorkflowError::Creation {
      message: e.to_string(),
    };
    self.checkpoints.save(&state).await.map_err(creation)?;
    self.checkpoints.register(&instance_id).await.map_err(creation)?;

    info!(instance_id = %instance_id, target = %state.input.target, "workflow_created");
    Ok(state)
  }

  async fn terminate(&self, instance_id: &str) -> Result<(), WorkflowError> {
    let state = self.checkpoints.load(instance_id).await?;
    match (self.live.get(instance_id), state) {
      (_, Some(state)) if state.is_done() => Err(WorkflowError::AlreadyFinished {
        instance_id: instance_id.to_string(),
        status: state.status,
      }),
      (Some(token), _) => {
        token.cancel();
        info!(instance_id = %instance_id, "terminate_requested");
        Ok(())
      }
      (None, _) => Err(WorkflowError::NotFound {
        instance_id: instance_id.to_string(),
      }),
    }
  }

  fn spawn(&mut self, state: WorkflowState) {
    let instance_id = state.instance_id.clone();
    let token = CancellationToken::new();
    self.live.insert(instance_id.clone(), token.clone());

    let saga = Saga::new(
      state,
      self.executor.clone(),
      self.checkpoints.clone(),
      self.settings.clone(),
      token,
    );
    let permits = self.permits.clone();

    let task = async move {
      // The semaphore is never closed.
      let _permit = permits.acquire_owned().await.ok();
      let state = AssertUnwindSafe(saga.run()).catch_unwind().await.ok();
      InstanceExit { instance_id, state }
    };

    match &self.workers {
      Some(workers) => {
        self.tasks.spawn_on(task, workers);
      }
      None => {
        self.tasks.spawn(task);
      }
    }
  }

  async fn reap(&mut self, joined: Result<InstanceExit, JoinError>) {
    let exit = match joined {
      Ok(exit) => exit,
      Err(e) => {
        error!(error = %e, "instance task failed to join");
        return;
      }
    };
    self.live.remove(&exit.instance_id);

    match exit.state {
      Some(state) => info!(
        instance_id = %exit.instance_id,
        status = ?state.status,
        "workflow_finished"
      ),
      None => {
        error!(instance_id = %exit.instance_id, "workflow task panicked");
        if let Err(e) = self.mark_failed(&exit.instance_id, "workflow task panicked").await {
          error!(instance_id = %exit.instance_id, error = %e, "checkpoint_save_failed");
        }
      }
    }
  }

  async fn mark_failed(&self, instance_id: &str, message: &str) -> Result<(), WorkflowError> {
    let Some(mut state) = self.checkpoints.load(instance_id).await? else {
      return Ok(());
    };
    if state.is_done() {
      return Ok(());
    }
    state.error = Some(message.to_string());
    state.result = Some(ScanOutcome::failed(None));
    state.transition(WorkflowStatus::Failed);
    self.checkpoints.save(&state).await?;
    self.checkpoints.unregister(instance_id).await
  }
}

/// Cloneable control surface for an [`Orchestrator`].
///
/// Start and terminate go through the orchestrator loop; status reads the
/// checkpoint directly.
#[derive(Clone)]
pub struct OrchestratorHandle {
  sender: mpsc::Sender<Command>,
  checkpoints: CheckpointStore,
}

impl OrchestratorHandle {
  /// Create and schedule a new instance, returning its id.
  pub async fn start(&self, payload: ScanPayload) -> Result<String, WorkflowError> {
    if payload.target.trim().is_empty() {
      return Err(WorkflowError::invalid_input("target must not be empty"));
    }

    let (reply, response) = oneshot::channel();
    self
      .sender
      .send(Command::Start { payload, reply })
      .await
      .map_err(|_| WorkflowError::Unavailable)?;
    response.await.map_err(|_| WorkflowError::Unavailable)?
  }

  /// Latest checkpointed state of an instance.
  pub async fn status(&self, instance_id: &str) -> Result<WorkflowState, WorkflowError> {
    let instance_id = instance_id.trim();
    if instance_id.is_empty() {
      return Err(WorkflowError::invalid_input("instance id must not be empty"));
    }

    self
      .checkpoints
      .load(instance_id)
      .await?
      .ok_or_else(|| WorkflowError::NotFound {
        instance_id: instance_id.to_string(),
      })
  }

  /// Scan result of an instance with its report read back from the store.
  ///
  /// `None` until the instance has finished.
  pub async fn result(&self, state: &WorkflowState) -> Result<Option<ScanResult>, WorkflowError> {
    match &state.result {
      Some(outcome) => Ok(Some(outcome.resolve(self.checkpoints.store()).await?)),
      None => Ok(None),
    }
  }

  /// Request cancellation. The instance stops at its next activity boundary.
  pub async fn terminate(&self, instance_id: &str) -> Result<(), WorkflowError> {
    let instance_id = instance_id.trim();
    if instance_id.is_empty() {
      return Err(WorkflowError::invalid_input("instance id must not be empty"));
    }

    let (reply, response) = oneshot::channel();
    self
      .sender
      .send(Command::Terminate {
        instance_id: instance_id.to_string(),
        reply,
      })
      .await
      .map_err(|_| WorkflowError::Unavailable)?;
    response.await.map_err(|_| WorkflowError::Unavailable)?
  }

  /// Poll until the instance reaches a terminal status.
  pub async fn wait_until_done(
    &self,
    instance_id: &str,
    poll: Duration,
  ) -> Result<WorkflowState, WorkflowError> {
    loop {
      let state = self.status(instance_id).await?;
      if state.is_done() {
        return Ok(state);
      }
      tokio::time::sleep(poll).await;
    }
  }
}
