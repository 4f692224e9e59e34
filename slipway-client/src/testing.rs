//! In-memory doubles of the external APIs
//!
//! Enabled with the `test-support` feature. Each double keeps its state behind
//! a mutex and counts the calls that matter to callers (commits, ref advances,
//! uploads, polls).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::builds::{ArtifactSource, BuildStatusSource, BundleManifest};
use crate::dispatch::{
    ForwardRequest, ForwardResponse, Forwarded, ScriptForwarder, ScriptInfo, ScriptStore,
    ScriptUpload, asset_prefix,
};
use crate::error::{ClientError, Result};
use crate::files::FileSetProvider;
use crate::source::{BranchHead, RefAdvance, SourceHost, TreeEntry};
use slipway_core::domain::build::BuildRunLookup;
use slipway_core::domain::bundle::Bundle;
use slipway_core::domain::file_set::{FileSet, git_blob_id};
use slipway_core::domain::identity::ScriptIdentity;

// =============================================================================
// Source host
// =============================================================================

#[derive(Debug, Clone)]
struct CommitObject {
    tree: String,
    parent: Option<String>,
    message: String,
}

#[derive(Debug, Default)]
struct RepoState {
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, Vec<TreeEntry>>,
    commits: HashMap<String, CommitObject>,
    refs: HashMap<String, String>,
}

/// Git object store with the same create/advance semantics as a real host
#[derive(Debug, Default)]
pub struct InMemorySourceHost {
    repos: Mutex<HashMap<String, RepoState>>,
    /// Ref advances that lose a race against a simulated concurrent push
    racing_pushes: AtomicUsize,
    blobs_created: AtomicUsize,
    trees_created: AtomicUsize,
    commits_created: AtomicUsize,
    ref_advances: AtomicUsize,
    object_counter: AtomicUsize,
}

impl InMemorySourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` ref advances find the branch moved by someone else
    pub fn race_next_advances(&self, n: usize) {
        self.racing_pushes.store(n, Ordering::SeqCst);
    }

    pub fn blobs_created(&self) -> usize {
        self.blobs_created.load(Ordering::SeqCst)
    }

    pub fn trees_created(&self) -> usize {
        self.trees_created.load(Ordering::SeqCst)
    }

    pub fn commits_created(&self) -> usize {
        self.commits_created.load(Ordering::SeqCst)
    }

    /// Successful ref moves; each one is a build trigger
    pub fn ref_advances(&self) -> usize {
        self.ref_advances.load(Ordering::SeqCst)
    }

    pub fn branch_tip(&self, repository: &str, branch: &str) -> Option<String> {
        let repos = self.repos.lock().unwrap();
        repos.get(repository)?.refs.get(branch).cloned()
    }

    pub fn commit_message(&self, repository: &str, sha: &str) -> Option<String> {
        let repos = self.repos.lock().unwrap();
        Some(repos.get(repository)?.commits.get(sha)?.message.clone())
    }

    pub fn commit_parent(&self, repository: &str, sha: &str) -> Option<String> {
        let repos = self.repos.lock().unwrap();
        repos.get(repository)?.commits.get(sha)?.parent.clone()
    }

    /// Files at the tip of a branch
    pub fn files_at(&self, repository: &str, branch: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let repos = self.repos.lock().unwrap();
        let repo = repos.get(repository)?;
        let commit = repo.commits.get(repo.refs.get(branch)?)?;
        let tree = repo.trees.get(&commit.tree)?;

        Some(
            tree.iter()
                .filter_map(|e| Some((e.path.clone(), repo.blobs.get(&e.sha)?.clone())))
                .collect(),
        )
    }

    /// Seeds a branch with a commit holding `files`, bypassing the counters
    pub fn seed_branch(&self, repository: &str, branch: &str, files: &[(&str, &str)]) -> String {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.entry(repository.to_string()).or_default();

        let entries: Vec<TreeEntry> = files
            .iter()
            .map(|(path, content)| {
                let sha = git_blob_id(content.as_bytes());
                repo.blobs.insert(sha.clone(), content.as_bytes().to_vec());
                TreeEntry {
                    path: path.to_string(),
                    mode: crate::source::FILE_MODE.to_string(),
                    sha,
                }
            })
            .collect();
        let tree = self.store_tree(repo, entries);
        let parent = repo.refs.get(branch).cloned();
        let sha = self.store_commit(repo, "seed", tree, parent);
        repo.refs.insert(branch.to_string(), sha.clone());
        sha
    }

    fn next_object_id(&self, kind: &str, payload: &str) -> String {
        let n = self.object_counter.fetch_add(1, Ordering::SeqCst);
        git_blob_id(format!("{} {} {}", kind, n, payload).as_bytes())
    }

    fn store_tree(&self, repo: &mut RepoState, entries: Vec<TreeEntry>) -> String {
        let listing = entries
            .iter()
            .map(|e| format!("{} {} {}", e.mode, e.path, e.sha))
            .collect::<Vec<_>>()
            .join("\n");
        let sha = self.next_object_id("tree", &listing);
        repo.trees.insert(sha.clone(), entries);
        sha
    }

    fn store_commit(&self, repo: &mut RepoState, message: &str, tree: String, parent: Option<String>) -> String {
        let sha = self.next_object_id("commit", &tree);
        repo.commits.insert(
            sha.clone(),
            CommitObject {
                tree,
                parent,
                message: message.to_string(),
            },
        );
        sha
    }

    fn simulate_concurrent_push(&self, repo: &mut RepoState, branch: &str) {
        let parent = repo.refs.get(branch).cloned();
        let tree = parent
            .as_ref()
            .and_then(|sha| repo.commits.get(sha))
            .map(|c| c.tree.clone());
        let tree = match tree {
            Some(tree) => tree,
            None => self.store_tree(repo, Vec::new()),
        };
        let sha = self.store_commit(repo, "concurrent push", tree, parent);
        repo.refs.insert(branch.to_string(), sha);
    }
}

#[async_trait]
impl SourceHost for InMemorySourceHost {
    async fn read_head(&self, repository: &str, branch: &str) -> Result<Option<BranchHead>> {
        let repos = self.repos.lock().unwrap();
        let Some(repo) = repos.get(repository) else {
            return Ok(None);
        };
        let Some(commit_sha) = repo.refs.get(branch) else {
            return Ok(None);
        };

        let tree = repo
            .commits
            .get(commit_sha)
            .and_then(|c| repo.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();

        Ok(Some(BranchHead {
            commit_sha: commit_sha.clone(),
            tree,
        }))
    }

    async fn create_blob(&self, repository: &str, content: &[u8]) -> Result<String> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.entry(repository.to_string()).or_default();
        let sha = git_blob_id(content);
        repo.blobs.insert(sha.clone(), content.to_vec());
        self.blobs_created.fetch_add(1, Ordering::SeqCst);
        Ok(sha)
    }

    async fn create_tree(&self, repository: &str, entries: &[TreeEntry]) -> Result<String> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.entry(repository.to_string()).or_default();

        if let Some(missing) = entries.iter().find(|e| !repo.blobs.contains_key(&e.sha)) {
            return Err(ClientError::api_error(422, format!("unknown blob {}", missing.sha)));
        }

        self.trees_created.fetch_add(1, Ordering::SeqCst);
        Ok(self.store_tree(repo, entries.to_vec()))
    }

    async fn create_commit(
        &self,
        repository: &str,
        message: &str,
        tree_sha: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.entry(repository.to_string()).or_default();

        if !repo.trees.contains_key(tree_sha) {
            return Err(ClientError::api_error(422, format!("unknown tree {}", tree_sha)));
        }

        self.commits_created.fetch_add(1, Ordering::SeqCst);
        Ok(self.store_commit(repo, message, tree_sha.to_string(), parent.map(str::to_string)))
    }

    async fn advance_ref(
        &self,
        repository: &str,
        branch: &str,
        expected: Option<&str>,
        new_sha: &str,
    ) -> Result<RefAdvance> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.entry(repository.to_string()).or_default();

        let racing = self
            .racing_pushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            self.simulate_concurrent_push(repo, branch);
        }

        if repo.refs.get(branch).map(String::as_str) != expected {
            return Ok(RefAdvance::Conflict);
        }

        repo.refs.insert(branch.to_string(), new_sha.to_string());
        self.ref_advances.fetch_add(1, Ordering::SeqCst);
        Ok(RefAdvance::Advanced)
    }
}

// =============================================================================
// Build system
// =============================================================================

/// Replays a fixed sequence of lookups, repeating the last one forever
#[derive(Debug)]
pub struct ScriptedBuildStatus {
    script: Mutex<VecDeque<BuildRunLookup>>,
    polls: AtomicUsize,
}

impl ScriptedBuildStatus {
    pub fn new(lookups: impl IntoIterator<Item = BuildRunLookup>) -> Self {
        Self {
            script: Mutex::new(lookups.into_iter().collect()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildStatusSource for ScriptedBuildStatus {
    async fn run_for_commit(&self, _repository: &str, _commit_sha: &str) -> Result<BuildRunLookup> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        Ok(next.unwrap_or(BuildRunLookup::NotFoundYet))
    }
}

/// Bundles keyed by run id
#[derive(Debug, Default)]
pub struct InMemoryArtifacts {
    bundles: Mutex<HashMap<u64, Bundle>>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run_id: u64, bundle: Bundle) {
        self.bundles.lock().unwrap().insert(run_id, bundle);
    }
}

#[async_trait]
impl ArtifactSource for InMemoryArtifacts {
    async fn download_bundle(&self, _repository: &str, run_id: u64, dest: &Path) -> Result<()> {
        let manifest = {
            let bundles = self.bundles.lock().unwrap();
            let bundle = bundles
                .get(&run_id)
                .ok_or_else(|| ClientError::NotFound(format!("bundle for run {}", run_id)))?;
            BundleManifest::from_bundle(bundle)
        };

        let json = serde_json::to_vec(&manifest)
            .map_err(|e| ClientError::InternalError(e.to_string()))?;
        tokio::fs::write(dest, json).await?;
        Ok(())
    }
}

// =============================================================================
// Dispatch platform
// =============================================================================

/// What the platform stores for one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredScript {
    pub upload: ScriptUpload,
    pub etag: String,
}

impl StoredScript {
    /// Bytes of the module the platform executes
    pub fn main_module_content(&self) -> Option<&[u8]> {
        self.upload
            .modules
            .iter()
            .find(|m| m.name == self.upload.metadata.main_module)
            .map(|m| m.content.as_slice())
    }
}

/// Dispatch namespaces plus the forwarding endpoint
///
/// A forwarded request is answered with the stored script's main module
/// content, which lets tests check exactly which bytes are live.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    scripts: Mutex<HashMap<ScriptIdentity, StoredScript>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    upserts: AtomicUsize,
    upsert_failure: Mutex<Option<u16>>,
    forwards: Mutex<Vec<(ScriptIdentity, ForwardRequest)>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, identity: &ScriptIdentity) -> Option<StoredScript> {
        self.scripts.lock().unwrap().get(identity).cloned()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn asset(&self, identity: &ScriptIdentity, release: &str, path: &str) -> Option<Vec<u8>> {
        self.assets
            .lock()
            .unwrap()
            .get(&format!("{}/{}", asset_prefix(identity, release), path))
            .cloned()
    }

    /// Every stored asset key, sorted
    pub fn asset_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.assets.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Makes every following upsert fail with `status` until cleared
    pub fn fail_upserts(&self, status: Option<u16>) {
        *self.upsert_failure.lock().unwrap() = status;
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn forwarded(&self) -> Vec<(ScriptIdentity, ForwardRequest)> {
        self.forwards.lock().unwrap().clone()
    }
}

fn etag_for(upload: &ScriptUpload) -> String {
    let mut content = Vec::new();
    content.extend_from_slice(upload.metadata.main_module.as_bytes());
    for module in &upload.modules {
        content.extend_from_slice(module.name.as_bytes());
        content.extend_from_slice(&module.content);
    }
    git_blob_id(&content)
}

#[async_trait]
impl ScriptStore for InMemoryPlatform {
    async fn upsert_script(&self, identity: &ScriptIdentity, upload: ScriptUpload) -> Result<ScriptInfo> {
        if let Some(status) = *self.upsert_failure.lock().unwrap() {
            return Err(ClientError::api_error(status, "platform rejected the upload"));
        }

        let etag = etag_for(&upload);
        self.scripts.lock().unwrap().insert(
            identity.clone(),
            StoredScript {
                upload,
                etag: etag.clone(),
            },
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);

        Ok(ScriptInfo {
            id: identity.script_name.clone(),
            etag,
            modified_on: None,
        })
    }

    async fn upload_asset(
        &self,
        identity: &ScriptIdentity,
        release: &str,
        path: &str,
        _content_type: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        self.assets
            .lock()
            .unwrap()
            .insert(format!("{}/{}", asset_prefix(identity, release), path), content);
        Ok(())
    }
}

#[async_trait]
impl ScriptForwarder for InMemoryPlatform {
    async fn forward(&self, identity: &ScriptIdentity, request: ForwardRequest) -> Result<Forwarded> {
        self.forwards
            .lock()
            .unwrap()
            .push((identity.clone(), request));

        let Some(stored) = self.script(identity) else {
            return Ok(Forwarded::ScriptMissing);
        };

        Ok(Forwarded::Response(ForwardResponse {
            status: 200,
            headers: vec![("etag".to_string(), stored.etag.clone())],
            body: stored.main_module_content().unwrap_or_default().to_vec(),
        }))
    }
}

// =============================================================================
// File-content provider
// =============================================================================

/// File sets keyed by `(tenant_id, version)`
#[derive(Debug, Default)]
pub struct StaticFileSets {
    sets: Mutex<HashMap<(String, String), FileSet>>,
}

impl StaticFileSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: &str, version: &str, files: FileSet) {
        self.sets
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), version.to_string()), files);
    }
}

#[async_trait]
impl FileSetProvider for StaticFileSets {
    async fn fetch_file_set(&self, tenant_id: &str, version: &str) -> Result<FileSet> {
        self.sets
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{} at {}", tenant_id, version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_advance_rejects_stale_expected() {
        let host = InMemorySourceHost::new();
        let first = host.seed_branch("acme/site", "main", &[("a.txt", "a")]);
        host.seed_branch("acme/site", "main", &[("a.txt", "b")]);

        let outcome = host
            .advance_ref("acme/site", "main", Some(&first), "deadbeef")
            .await
            .unwrap();
        assert_eq!(outcome, RefAdvance::Conflict);
        assert_eq!(host.ref_advances(), 0);
    }

    #[tokio::test]
    async fn test_create_ref_conflicts_when_branch_exists() {
        let host = InMemorySourceHost::new();
        host.seed_branch("acme/site", "main", &[("a.txt", "a")]);

        let outcome = host
            .advance_ref("acme/site", "main", None, "deadbeef")
            .await
            .unwrap();
        assert_eq!(outcome, RefAdvance::Conflict);
    }

    #[tokio::test]
    async fn test_scripted_build_status_repeats_last() {
        let status = ScriptedBuildStatus::new([
            BuildRunLookup::NotFoundYet,
            BuildRunLookup::Running { run_id: 1 },
        ]);

        assert_eq!(status.run_for_commit("r", "s").await.unwrap(), BuildRunLookup::NotFoundYet);
        assert_eq!(
            status.run_for_commit("r", "s").await.unwrap(),
            BuildRunLookup::Running { run_id: 1 }
        );
        assert_eq!(
            status.run_for_commit("r", "s").await.unwrap(),
            BuildRunLookup::Running { run_id: 1 }
        );
        assert_eq!(status.polls(), 3);
    }
}
