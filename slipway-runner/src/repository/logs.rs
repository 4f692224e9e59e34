//! Logs repository
//!
//! Sends buffered attempt logs to the orchestrator. Buffering itself lives in
//! the execution context.

use async_trait::async_trait;
use slipway_client::{OrchestratorClient, Result};
use slipway_core::domain::log::LogEntry;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn send_logs(&self, deployment_id: Uuid, entries: Vec<LogEntry>) -> Result<()>;
}

pub struct HttpLogRepository {
    client: Arc<OrchestratorClient>,
}

impl HttpLogRepository {
    pub fn new(client: Arc<OrchestratorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogRepository for HttpLogRepository {
    async fn send_logs(&self, deployment_id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.client.send_logs(deployment_id, entries).await
    }
}
