//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod deployment;
pub mod tenant;

// Re-export for convenience
pub use deployment as deployment_service;
pub use tenant as tenant_service;
