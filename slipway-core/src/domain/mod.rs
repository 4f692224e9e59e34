//! Core domain types
//!
//! This module contains the core domain structures used across Slipway services.
//! They are shared between the orchestrator (persists deployment state), the
//! runner (drives deployments) and the edge (routes requests).

pub mod build;
pub mod bundle;
pub mod deployment;
pub mod environment;
pub mod file_set;
pub mod identity;
pub mod log;
pub mod tenant;
