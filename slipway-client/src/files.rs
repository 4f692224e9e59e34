//! File-content provider client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::Result;
use crate::handle_response;
use slipway_core::domain::file_set::FileSet;

/// Source of complete file sets per tenant version
#[async_trait]
pub trait FileSetProvider: Send + Sync {
    async fn fetch_file_set(&self, tenant_id: &str, version: &str) -> Result<FileSet>;
}

/// [`FileSetProvider`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpFileSetProvider {
    base_url: String,
    client: Client,
}

impl HttpFileSetProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    files: std::collections::BTreeMap<String, String>,
}

#[async_trait]
impl FileSetProvider for HttpFileSetProvider {
    async fn fetch_file_set(&self, tenant_id: &str, version: &str) -> Result<FileSet> {
        let url = format!(
            "{}/tenants/{}/versions/{}/files",
            self.base_url, tenant_id, version
        );
        let response = self.client.get(&url).send().await?;

        let body: FilesResponse = handle_response(response).await?;
        Ok(FileSet::new(body.files))
    }
}
