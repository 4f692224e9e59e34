//! Edge dispatch platform client
//!
//! Scripts live in dispatch namespaces, one namespace per environment class.
//! Uploading a script under an existing name replaces it in place, so there is
//! no separate activation step. Forwarding goes through the platform's
//! dispatch endpoint, which tells a missing script apart from a script answer.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use slipway_core::domain::bundle::BundleModule;
use slipway_core::domain::identity::ScriptIdentity;

/// Header the dispatch endpoint sets when the target script does not exist
pub const SCRIPT_MISSING_HEADER: &str = "x-dispatch-script-missing";

// =============================================================================
// Upload types
// =============================================================================

/// Binding exposed to the running script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptBinding {
    PlainText { name: String, text: String },
}

/// `metadata` part of a script upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub main_module: String,
    pub compatibility_date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<ScriptBinding>,
}

/// A complete script upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUpload {
    pub metadata: ScriptMetadata,
    pub modules: Vec<BundleModule>,
}

/// Script as stored by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub id: String,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub modified_on: Option<String>,
}

/// Namespace-scoped script storage
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Creates or replaces the script
    async fn upsert_script(&self, identity: &ScriptIdentity, upload: ScriptUpload) -> Result<ScriptInfo>;

    /// Stores a static asset under `{namespace}/{script}/{release}/{path}`
    ///
    /// Each bundle gets its own release prefix, so uploading the assets of a
    /// new bundle never touches what the live script serves.
    async fn upload_asset(
        &self,
        identity: &ScriptIdentity,
        release: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<()>;
}

/// Relative location of one release's assets
pub fn asset_prefix(identity: &ScriptIdentity, release: &str) -> String {
    format!("{}/{}/{}", identity.namespace, identity.script_name, release)
}

// =============================================================================
// Forwarding types
// =============================================================================

/// Inbound request, already stripped of hop-by-hop headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarded {
    Response(ForwardResponse),
    /// Nothing is deployed under the identity
    ScriptMissing,
}

/// Invokes a script inside its namespace
#[async_trait]
pub trait ScriptForwarder: Send + Sync {
    async fn forward(&self, identity: &ScriptIdentity, request: ForwardRequest) -> Result<Forwarded>;
}

// =============================================================================
// Platform API implementation
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<EnvelopeMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

impl<T> Envelope<T> {
    fn into_result(self, status: StatusCode) -> Result<T> {
        if !self.success {
            let message = self
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        self.result
            .ok_or_else(|| ClientError::ParseError("platform response has no result".to_string()))
    }
}

/// [`ScriptStore`] backed by the platform's dispatch-namespace REST API
#[derive(Debug, Clone)]
pub struct DispatchPlatformClient {
    base_url: String,
    account_id: String,
    token: String,
    client: Client,
}

impl DispatchPlatformClient {
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            token: token.into(),
            client: Client::new(),
        }
    }

    fn script_url(&self, identity: &ScriptIdentity) -> String {
        format!(
            "{}/accounts/{}/workers/dispatch/namespaces/{}/scripts/{}",
            self.base_url, self.account_id, identity.namespace, identity.script_name
        )
    }

    fn asset_url(&self, identity: &ScriptIdentity, release: &str, path: &str) -> String {
        format!(
            "{}/accounts/{}/workers/assets/{}/{}",
            self.base_url,
            self.account_id,
            asset_prefix(identity, release),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|_| {
            if status.is_success() {
                ClientError::ParseError(format!("unexpected platform response: {}", text))
            } else {
                ClientError::api_error(status.as_u16(), text.clone())
            }
        })?;

        envelope.into_result(status)
    }
}

/// Builds the multipart body: `metadata` JSON plus one part per module
pub fn upload_form(upload: ScriptUpload) -> Result<Form> {
    let metadata = serde_json::to_string(&upload.metadata)
        .map_err(|e| ClientError::InvalidRequest(format!("unserializable metadata: {}", e)))?;

    let mut form = Form::new().part(
        "metadata",
        Part::text(metadata)
            .mime_str("application/json")
            .map_err(ClientError::RequestFailed)?,
    );

    for module in upload.modules {
        let part = Part::bytes(module.content)
            .file_name(module.name.clone())
            .mime_str(&module.content_type)
            .map_err(ClientError::RequestFailed)?;
        form = form.part(module.name, part);
    }

    Ok(form)
}

#[async_trait]
impl ScriptStore for DispatchPlatformClient {
    async fn upsert_script(&self, identity: &ScriptIdentity, upload: ScriptUpload) -> Result<ScriptInfo> {
        let form = upload_form(upload)?;
        let response = self
            .request(Method::PUT, self.script_url(identity))
            .multipart(form)
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn upload_asset(
        &self,
        identity: &ScriptIdentity,
        release: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let response = self
            .request(Method::PUT, self.asset_url(identity, release, path))
            .header("Content-Type", content_type)
            .body(content)
            .send()
            .await?;

        crate::check_status(response).await.map(|_| ())
    }
}

// =============================================================================
// Dispatch endpoint implementation
// =============================================================================

/// [`ScriptForwarder`] that relays requests through the dispatch endpoint
#[derive(Debug, Clone)]
pub struct DispatchForwarder {
    dispatch_url: String,
    client: Client,
}

impl DispatchForwarder {
    pub fn new(dispatch_url: impl Into<String>) -> Self {
        Self::with_client(dispatch_url, Client::new())
    }

    pub fn with_client(dispatch_url: impl Into<String>, client: Client) -> Self {
        Self {
            dispatch_url: dispatch_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn target_url(&self, identity: &ScriptIdentity, path_and_query: &str) -> String {
        let path = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };

        format!(
            "{}/{}/{}{}",
            self.dispatch_url, identity.namespace, identity.script_name, path
        )
    }
}

#[async_trait]
impl ScriptForwarder for DispatchForwarder {
    async fn forward(&self, identity: &ScriptIdentity, request: ForwardRequest) -> Result<Forwarded> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ClientError::InvalidRequest(format!("bad method {}", request.method)))?;

        let mut builder = self
            .client
            .request(method, self.target_url(identity, &request.path_and_query));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;

        if response.headers().contains_key(SCRIPT_MISSING_HEADER) {
            return Ok(Forwarded::ScriptMissing);
        }

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Forwarded::Response(ForwardResponse {
            status,
            headers,
            body,
        }))
    }
}
