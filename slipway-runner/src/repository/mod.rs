//! Repository layer
//!
//! Repositories are thin adapters over the orchestrator API. They carry no
//! business logic; the pipeline and the poller depend on the traits so they
//! can be driven against fakes in tests.

mod deployments;
mod logs;

// Re-export traits
pub use deployments::DeploymentRepository;
pub use logs::LogRepository;

// Re-export implementations
pub use deployments::HttpDeploymentRepository;
pub use logs::HttpLogRepository;
