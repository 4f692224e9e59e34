//! Data Transfer Objects for inter-service communication
//!
//! DTOs used between Slipway services (orchestrator, runner, CLI). They are
//! lightweight request/response shapes around the domain types.

pub mod deployment;
pub mod error;
pub mod tenant;
