//! Slipway Runner
//!
//! Stateless worker that turns pending deployment attempts into live scripts.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Repositories: HTTP communication with the orchestrator (deployments, logs)
//! - Pipeline stages: source synchronization, build monitoring, publishing
//! - Scheduler: polling, claiming and the per-attempt task lifecycle
//!
//! Each claimed attempt runs in its own task with its own workspace, streams
//! logs back periodically and reports its terminal state to the orchestrator.

pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod publish;
pub mod repository;
pub mod scheduler;
pub mod sync;
pub mod workspace;
