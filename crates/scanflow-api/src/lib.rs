//! Scanflow API
//!
//! HTTP control surface over an [`OrchestratorHandle`]:
//!
//! | Method | Path      | Body                          | Response                  |
//! |--------|-----------|-------------------------------|---------------------------|
//! | POST   | `/run`    | target, or JSON `ScanPayload` | instance id (JSON string) |
//! | GET    | `/status` | instance id                   | status document           |
//! | POST   | `/kill`   | instance id                   | `Workflow terminated`     |
//! | GET    | `/health` | none                          | `{"status":"ok"}`         |
//!
//! Every failure is answered with `400` and `{"message": ...}`.
//!
//! [`OrchestratorHandle`]: scanflow_orchestrator::OrchestratorHandle

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{StatusResponse, router};
