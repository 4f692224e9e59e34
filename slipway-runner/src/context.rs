//! Execution context for deployment attempts
//!
//! Contains all state a running attempt carries around:
//! - Log buffer, drained periodically to the orchestrator
//! - Workspace for build outputs
//! - Cancellation token tripped when the attempt is cancelled remotely

use slipway_core::domain::log::{LogEntry, LogLevel};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::workspace::Workspace;

/// Execution context shared between the pipeline and its helper tasks
pub struct Context {
    pub deployment_id: Uuid,

    pub workspace: Workspace,

    pub cancel: CancellationToken,

    log_buffer: Mutex<Vec<LogEntry>>,
}

impl Context {
    pub fn new(deployment_id: Uuid, workspace: Workspace) -> Arc<Self> {
        Arc::new(Self {
            deployment_id,
            workspace,
            cancel: CancellationToken::new(),
            log_buffer: Mutex::new(Vec::new()),
        })
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.log_buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_log(&self, entry: LogEntry) {
        self.buffer().push(entry);
    }

    pub fn log_debug(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Returns all buffered entries and clears the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        self.buffer().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_empties_buffer_in_order() {
        let base = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let context = Context::new(id, Workspace::create(base.path(), id).await.unwrap());

        context.log_info("first");
        context.log_error("second");

        let drained = context.drain_logs();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "first");
        assert_eq!(drained[1].level, LogLevel::Error);
        assert!(context.drain_logs().is_empty());
    }
}
