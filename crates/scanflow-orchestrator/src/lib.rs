//! Scanflow Orchestrator
//!
//! Drives workflow instances through the scan-and-fulfillment saga.
//!
//! ```text
//! ┌──────────────────────┐  Start/Terminate  ┌──────────────────────────┐
//! │ OrchestratorHandle   │ ───── mpsc ─────▶ │ Orchestrator::run        │
//! │ (Control API side)   │ ◀── oneshot ───── │  JoinSet of instance     │
//! └──────────┬───────────┘                   │  tasks on worker runtime │
//!            │ status reads                  └────────────┬─────────────┘
//!            ▼                                            │ per step
//! ┌──────────────────────┐       checkpoints      ┌───────▼──────────────┐
//! │ CheckpointStore      │ ◀───────────────────── │ Saga                 │
//! └──────────────────────┘                        │  ActivityExecutor    │
//!                                                 └──────────────────────┘
//! ```
//!
//! Every instance's [`WorkflowState`] is written to the state store after
//! each transition and each completed activity. On restart
//! [`Orchestrator::resume_all`] reschedules unfinished instances; recorded
//! steps are replayed from history without being invoked again.

mod checkpoint;
mod error;
mod runner;
mod saga;
mod state;
mod template;

pub use checkpoint::CheckpointStore;
pub use error::WorkflowError;
pub use runner::{Orchestrator, OrchestratorHandle};
pub use state::{Order, ScanPayload, StepRecord, WorkflowState, WorkflowStatus};
