//! Scheduler layer for the runner
//!
//! Polls the orchestrator for pending deployments and runs each claimed
//! attempt in its own task, from claim to completion.

pub mod poller;

pub use poller::DeploymentPoller;
