//! Source synchronization
//!
//! Turns a complete file set into exactly one commit on the environment's
//! branch, so one version costs one build trigger no matter how many files
//! changed. The commit is assembled from git objects and published with a
//! single non-forced ref move; if the branch moved in between, the whole
//! commit is rebuilt on top of the new head.

use std::collections::HashMap;
use std::sync::Arc;

use slipway_client::source::{FILE_MODE, RefAdvance, SourceHost, TreeEntry};
use slipway_core::domain::file_set::{FileSet, git_blob_id};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Default number of attempts before giving up with a sync conflict
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 3;

/// Commit that now heads the branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    /// Previous head, `None` when the branch was created
    pub parent: Option<String>,
    pub blobs_uploaded: usize,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Synchronizes file sets into hosted repositories
#[derive(Clone)]
pub struct Synchronizer {
    host: Arc<dyn SourceHost>,
    max_attempts: u32,
}

impl Synchronizer {
    pub fn new(host: Arc<dyn SourceHost>, max_attempts: u32) -> Self {
        Self {
            host,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Makes `branch` hold exactly `file_set`, as one new commit
    ///
    /// Paths at the head that are absent from `file_set` are deleted. The
    /// commit is created even when nothing changed, so every version produces
    /// exactly one build trigger.
    pub async fn sync(
        &self,
        repository: &str,
        branch: &str,
        file_set: &FileSet,
        message: &str,
    ) -> Result<CommitRef> {
        file_set.validate()?;

        for attempt in 1..=self.max_attempts {
            if let Some(commit) = self
                .try_sync(repository, branch, file_set, message, attempt)
                .await?
            {
                info!(
                    "Synchronized {} files to {}@{} as {} (attempt {})",
                    file_set.len(),
                    repository,
                    branch,
                    commit.sha,
                    attempt
                );
                return Ok(commit);
            }

            warn!(
                "Branch {}@{} moved during synchronization (attempt {}/{})",
                repository, branch, attempt, self.max_attempts
            );
        }

        Err(PipelineError::SyncConflict {
            branch: format!("{}@{}", repository, branch),
            attempts: self.max_attempts,
        })
    }

    /// One read-build-advance round; `None` means the advance lost a race
    async fn try_sync(
        &self,
        repository: &str,
        branch: &str,
        file_set: &FileSet,
        message: &str,
        attempt: u32,
    ) -> Result<Option<CommitRef>> {
        let head = self.host.read_head(repository, branch).await?;

        let existing: HashMap<&str, &str> = head
            .as_ref()
            .map(|h| {
                h.tree
                    .iter()
                    .map(|e| (e.path.as_str(), e.sha.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(file_set.len());
        let mut blobs_uploaded = 0;

        for (path, content) in file_set.iter() {
            let blob_id = git_blob_id(content.as_bytes());

            let sha = if existing.get(path.as_str()) == Some(&blob_id.as_str()) {
                blob_id
            } else {
                blobs_uploaded += 1;
                self.host.create_blob(repository, content.as_bytes()).await?
            };

            entries.push(TreeEntry {
                path: path.clone(),
                mode: FILE_MODE.to_string(),
                sha,
            });
        }

        debug!(
            "Uploaded {} of {} blobs for {}@{}",
            blobs_uploaded,
            file_set.len(),
            repository,
            branch
        );

        let parent = head.map(|h| h.commit_sha);
        let tree_sha = self.host.create_tree(repository, &entries).await?;
        let commit_sha = self
            .host
            .create_commit(repository, message, &tree_sha, parent.as_deref())
            .await?;

        match self
            .host
            .advance_ref(repository, branch, parent.as_deref(), &commit_sha)
            .await?
        {
            RefAdvance::Advanced => Ok(Some(CommitRef {
                sha: commit_sha,
                parent,
                blobs_uploaded,
                attempts: attempt,
            })),
            RefAdvance::Conflict => Ok(None),
        }
    }
}
