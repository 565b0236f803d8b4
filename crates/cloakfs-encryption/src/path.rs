//! Version paths → canonical paths.
//!
//! Every user tree is laid out as `/<user>/<storage segment>/...`. Live files
//! sit under the files segment; version copies sit under the versions
//! segment with a `.v<timestamp>` suffix:
//!
//! ```text
//! /user1/files_versions/foo/bar.txt.v5454  →  /user1/files/foo/bar.txt
//! ```
//!
//! A version copy is encrypted with the keys of its live file, so both
//! resolve to the same canonical path.

use cloakfs_core::config::EncryptionConfig;
use cloakfs_core::{CloakError, CloakResult};

/// Index of the storage segment in `"/<user>/<segment>/..."` split on `/`.
const SEGMENT_INDEX: usize = 2;

/// Names of the live and version segments. Always two distinct single
/// path segments, otherwise a resolved path could resolve again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    files_dir: String,
    versions_dir: String,
}

impl Default for PathLayout {
    fn default() -> Self {
        Self {
            files_dir: "files".into(),
            versions_dir: "files_versions".into(),
        }
    }
}

impl TryFrom<&EncryptionConfig> for PathLayout {
    type Error = CloakError;

    fn try_from(config: &EncryptionConfig) -> CloakResult<Self> {
        Self::new(config.files_dir.as_str(), config.versions_dir.as_str())
    }
}

impl PathLayout {
    pub fn new(files_dir: impl Into<String>, versions_dir: impl Into<String>) -> CloakResult<Self> {
        let files_dir = files_dir.into();
        let versions_dir = versions_dir.into();
        for name in [&files_dir, &versions_dir] {
            if name.is_empty() || name.contains('/') {
                return Err(CloakError::Config(format!(
                    "storage directory {name:?} must be a single non-empty path segment"
                )));
            }
        }
        if files_dir == versions_dir {
            return Err(CloakError::Config(format!(
                "files and versions directories are both {files_dir:?}"
            )));
        }
        Ok(Self {
            files_dir,
            versions_dir,
        })
    }

    pub fn files_dir(&self) -> &str {
        &self.files_dir
    }

    pub fn versions_dir(&self) -> &str {
        &self.versions_dir
    }

    /// Canonical path governing the keys of `path`.
    ///
    /// Total and idempotent: anything that is not a version copy comes back
    /// unchanged, and a canonical path is never a version copy.
    pub fn resolve(&self, path: &str) -> String {
        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.len() <= SEGMENT_INDEX + 1 || segments[SEGMENT_INDEX] != self.versions_dir {
            return path.to_string();
        }

        let last = segments.len() - 1;
        let Some(stem) = strip_version_suffix(segments[last]) else {
            return path.to_string();
        };

        segments[SEGMENT_INDEX] = &self.files_dir;
        segments[last] = stem;
        segments.join("/")
    }

    /// Whether `path` names a version copy rather than a live file.
    pub fn is_version_path(&self, path: &str) -> bool {
        self.resolve(path) != path
    }
}

/// `"bar.txt.v5454"` → `Some("bar.txt")`. The stem must be non-empty.
fn strip_version_suffix(name: &str) -> Option<&str> {
    let (stem, version) = name.rsplit_once(".v")?;
    if stem.is_empty() || version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(stem)
}
