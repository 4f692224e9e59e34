//! Versioned file sets
//!
//! A file set is the complete `{path -> content}` map of a tenant application
//! at one version. Paths missing from a file set are deleted when it is
//! synchronized, so an empty set is never accepted.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use thiserror::Error;

/// Complete file set of one version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileSetError {
    #[error("file set is empty; refusing to delete every file")]
    Empty,

    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

impl FileSet {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.files.iter()
    }

    /// Rejects empty sets and paths that are absolute or escape the tree
    pub fn validate(&self) -> Result<(), FileSetError> {
        if self.files.is_empty() {
            return Err(FileSetError::Empty);
        }

        for path in self.files.keys() {
            if !is_valid_path(path) {
                return Err(FileSetError::InvalidPath(path.clone()));
            }
        }

        Ok(())
    }
}

impl FromIterator<(String, String)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Git object id of a blob with the given content
///
/// Matches `git hash-object`, which lets the synchronizer skip uploading files
/// whose content is already at the branch head.
pub fn git_blob_id(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_blob_id_matches_git() {
        // `printf 'hello\n' | git hash-object --stdin`
        assert_eq!(
            git_blob_id(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        // empty blob
        assert_eq!(git_blob_id(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_validate() {
        let ok: FileSet = [("src/index.ts".to_string(), "x".to_string())]
            .into_iter()
            .collect();
        assert!(ok.validate().is_ok());

        assert_eq!(FileSet::default().validate(), Err(FileSetError::Empty));

        for bad in ["/etc/passwd", "a/../b", "a//b", "./a", "a\\b"] {
            let set: FileSet = [(bad.to_string(), String::new())].into_iter().collect();
            assert!(
                matches!(set.validate(), Err(FileSetError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }
}
