//! Source host git-data client
//!
//! The synchronizer builds commits out of low-level git objects (blob, tree,
//! commit, ref) instead of pushing files one at a time. Each file write at a
//! hosted repository is a push, and each push is a build trigger.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::{check_status, handle_response};

/// Regular, non-executable file
pub const FILE_MODE: &str = "100644";

/// Blob entry of a recursive tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub sha: String,
}

/// Commit and flattened tree at the tip of a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub commit_sha: String,
    pub tree: Vec<TreeEntry>,
}

/// Outcome of a non-forced ref update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefAdvance {
    Advanced,
    /// The branch moved (or appeared) since it was read
    Conflict,
}

/// Git-data primitives of a hosted repository
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Reads the branch tip and its recursive tree
    ///
    /// Returns `None` when the branch (or the whole repository history) does
    /// not exist yet.
    async fn read_head(&self, repository: &str, branch: &str) -> Result<Option<BranchHead>>;

    /// Uploads a blob and returns its object id
    async fn create_blob(&self, repository: &str, content: &[u8]) -> Result<String>;

    /// Creates a tree holding exactly `entries`
    async fn create_tree(&self, repository: &str, entries: &[TreeEntry]) -> Result<String>;

    async fn create_commit(
        &self,
        repository: &str,
        message: &str,
        tree_sha: &str,
        parent: Option<&str>,
    ) -> Result<String>;

    /// Moves `branch` to `new_sha` without forcing
    ///
    /// `expected` is the tip the caller read; `None` means the branch did not
    /// exist and has to be created.
    async fn advance_ref(
        &self,
        repository: &str,
        branch: &str,
        expected: Option<&str>,
        new_sha: &str,
    ) -> Result<RefAdvance>;
}

// =============================================================================
// GitHub git-data implementation
// =============================================================================

/// [`SourceHost`] backed by the GitHub git-data REST API
#[derive(Debug, Clone)]
pub struct GitHubSourceHost {
    base_url: String,
    token: String,
    client: Client,
}

impl GitHubSourceHost {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn patch(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.patch(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "slipway")
    }
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<RawTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RawTreeEntry {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    tree: Vec<NewTreeEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct NewTreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[async_trait]
impl SourceHost for GitHubSourceHost {
    async fn read_head(&self, repository: &str, branch: &str) -> Result<Option<BranchHead>> {
        let response = self
            .get(&format!("/repos/{}/git/ref/heads/{}", repository, branch))
            .send()
            .await?;

        // 409 is what an empty repository answers
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::CONFLICT) {
            return Ok(None);
        }
        let head: RefResponse = handle_response(response).await?;

        let response = self
            .get(&format!("/repos/{}/git/commits/{}", repository, head.object.sha))
            .send()
            .await?;
        let commit: CommitResponse = handle_response(response).await?;

        let response = self
            .get(&format!("/repos/{}/git/trees/{}", repository, commit.tree.sha))
            .query(&[("recursive", "1")])
            .send()
            .await?;
        let tree: TreeResponse = handle_response(response).await?;

        if tree.truncated {
            return Err(ClientError::InternalError(format!(
                "tree of {}@{} is too large to list recursively",
                repository, branch
            )));
        }

        Ok(Some(BranchHead {
            commit_sha: head.object.sha,
            tree: tree
                .tree
                .into_iter()
                .filter(|entry| entry.kind == "blob")
                .map(|entry| TreeEntry {
                    path: entry.path,
                    mode: entry.mode,
                    sha: entry.sha,
                })
                .collect(),
        }))
    }

    async fn create_blob(&self, repository: &str, content: &[u8]) -> Result<String> {
        let response = self
            .post(&format!("/repos/{}/git/blobs", repository))
            .json(&CreateBlobRequest {
                content: BASE64.encode(content),
                encoding: "base64",
            })
            .send()
            .await?;

        let blob: ShaResponse = handle_response(response).await?;
        Ok(blob.sha)
    }

    async fn create_tree(&self, repository: &str, entries: &[TreeEntry]) -> Result<String> {
        // No base_tree: the new tree holds exactly these entries
        let request = CreateTreeRequest {
            tree: entries
                .iter()
                .map(|entry| NewTreeEntry {
                    path: &entry.path,
                    mode: &entry.mode,
                    kind: "blob",
                    sha: &entry.sha,
                })
                .collect(),
        };

        let response = self
            .post(&format!("/repos/{}/git/trees", repository))
            .json(&request)
            .send()
            .await?;

        let tree: ShaResponse = handle_response(response).await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        repository: &str,
        message: &str,
        tree_sha: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        let response = self
            .post(&format!("/repos/{}/git/commits", repository))
            .json(&CreateCommitRequest {
                message,
                tree: tree_sha,
                parents: parent.into_iter().collect(),
            })
            .send()
            .await?;

        let commit: ShaResponse = handle_response(response).await?;
        Ok(commit.sha)
    }

    async fn advance_ref(
        &self,
        repository: &str,
        branch: &str,
        expected: Option<&str>,
        new_sha: &str,
    ) -> Result<RefAdvance> {
        // A non-forced update only fast-forwards. The new commit's parent is
        // `expected`, so any other tip is rejected.
        let response = match expected {
            Some(_) => {
                self.patch(&format!("/repos/{}/git/refs/heads/{}", repository, branch))
                    .json(&UpdateRefRequest {
                        sha: new_sha,
                        force: false,
                    })
                    .send()
                    .await?
            }
            None => {
                self.post(&format!("/repos/{}/git/refs", repository))
                    .json(&CreateRefRequest {
                        reference: format!("refs/heads/{}", branch),
                        sha: new_sha,
                    })
                    .send()
                    .await?
            }
        };

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            tracing::debug!(repository, branch, "ref advance rejected: branch moved");
            return Ok(RefAdvance::Conflict);
        }

        check_status(response).await?;
        Ok(RefAdvance::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_base_url() {
        let host = GitHubSourceHost::new("https://api.github.com/", "token");
        assert_eq!(host.base_url, "https://api.github.com");
    }

    #[test]
    fn test_tree_listing_ignores_subtrees() {
        let json = r#"{
            "sha": "t",
            "tree": [
                {"path": "src", "mode": "040000", "type": "tree", "sha": "a"},
                {"path": "src/main.ts", "mode": "100644", "type": "blob", "sha": "b"}
            ],
            "truncated": false
        }"#;
        let tree: TreeResponse = serde_json::from_str(json).unwrap();
        let blobs: Vec<_> = tree.tree.iter().filter(|e| e.kind == "blob").collect();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].path, "src/main.ts");
    }

    #[test]
    fn test_root_commit_has_no_parents() {
        let request = CreateCommitRequest {
            message: "v1",
            tree: "t",
            parents: None.into_iter().collect(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["parents"], serde_json::json!([]));
    }
}
