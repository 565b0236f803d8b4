//! On-disk storage of wrapped file keys.
//!
//! Layout: `<key_root>/file-keys/<canonical path>/keys.json`, one JSON
//! `WrappedKeySet` per file. The document is replaced atomically, so a
//! reader sees either the previous recipient set or the new one in full.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use cloakfs_core::{CloakError, CloakResult};
use cloakfs_crypto::WrappedKeySet;
use tracing::debug;

const KEYS_DIR: &str = "file-keys";
const KEYS_FILE: &str = "keys.json";

#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    root: PathBuf,
}

impl FileKeyStorage {
    pub fn new(key_root: impl Into<PathBuf>) -> Self {
        Self {
            root: key_root.into(),
        }
    }

    /// Location of the key document for `canonical_path`.
    ///
    /// Rejects paths that would escape the key root.
    pub fn location(&self, canonical_path: &str) -> CloakResult<PathBuf> {
        let relative = Path::new(canonical_path.trim_start_matches('/'));
        let mut dir = self.root.join(KEYS_DIR);
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    dir.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => {
                    return Err(CloakError::Persist(format!(
                        "refusing key path outside key root: {canonical_path}"
                    )))
                }
            }
        }
        if depth == 0 {
            return Err(CloakError::Persist(format!(
                "empty file path for key storage: {canonical_path:?}"
            )));
        }
        Ok(dir.join(KEYS_FILE))
    }

    /// Replace all wrapped keys stored for `canonical_path`.
    pub fn write_all(&self, canonical_path: &str, keys: &WrappedKeySet) -> CloakResult<()> {
        if keys.is_empty() {
            return Err(CloakError::Persist(format!(
                "refusing to store an empty key set for {canonical_path}"
            )));
        }

        let target = self.location(canonical_path)?;
        let parent = target.parent().unwrap_or(Path::new("."));
        let persist_err = |what: &str, e: &dyn std::fmt::Display| {
            CloakError::Persist(format!("{what} {}: {e}", target.display()))
        };

        std::fs::create_dir_all(parent).map_err(|e| persist_err("creating dir for", &e))?;
        let json = serde_json::to_vec_pretty(keys).map_err(|e| persist_err("serializing", &e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| persist_err("creating temp file for", &e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| persist_err("writing", &e))?;
        tmp.persist(&target)
            .map_err(|e| persist_err("replacing", &e.error))?;

        debug!(path = %canonical_path, recipients = keys.len(), "file keys persisted");
        Ok(())
    }

    /// Wrapped keys for `canonical_path`, or `None` if none were stored.
    pub fn load(&self, canonical_path: &str) -> CloakResult<Option<WrappedKeySet>> {
        let target = self.location(canonical_path)?;
        if !target.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&target)?;
        let keys = serde_json::from_slice(&data).map_err(|e| {
            CloakError::KeyStore(format!("parsing file keys {}: {e}", target.display()))
        })?;
        Ok(Some(keys))
    }

    /// Remove the key document. Returns whether one existed.
    pub fn delete(&self, canonical_path: &str) -> CloakResult<bool> {
        let target = self.location(canonical_path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloakfs_crypto::{generate_file_key, multi_key_wrap, PublicKeyMap, RecipientKeyPair};

    fn wrapped_for(uids: &[&str]) -> WrappedKeySet {
        let map: PublicKeyMap = uids
            .iter()
            .map(|uid| (uid.to_string(), RecipientKeyPair::generate().public_key().clone()))
            .collect();
        multi_key_wrap(&generate_file_key(), &map).unwrap()
    }

    #[test]
    fn test_location_layout() {
        let storage = FileKeyStorage::new("/keys");
        assert_eq!(
            storage.location("/user1/files/foo/bar.txt").unwrap(),
            PathBuf::from("/keys/file-keys/user1/files/foo/bar.txt/keys.json")
        );
    }

    #[test]
    fn test_location_rejects_traversal() {
        let storage = FileKeyStorage::new("/keys");
        assert!(storage.location("/user1/../../etc/passwd").is_err());
        assert!(storage.location("/").is_err());
        assert!(storage.location("").is_err());
    }

    #[test]
    fn test_write_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileKeyStorage::new(dir.path());
        let keys = wrapped_for(&["user1", "user3"]);

        assert!(storage.load("/user1/files/a.txt").unwrap().is_none());
        storage.write_all("/user1/files/a.txt", &keys).unwrap();

        let loaded = storage.load("/user1/files/a.txt").unwrap().unwrap();
        assert_eq!(loaded, keys);

        assert!(storage.delete("/user1/files/a.txt").unwrap());
        assert!(!storage.delete("/user1/files/a.txt").unwrap());
        assert!(storage.load("/user1/files/a.txt").unwrap().is_none());
    }

    #[test]
    fn test_rewrite_replaces_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileKeyStorage::new(dir.path());

        storage.write_all("/u/files/f", &wrapped_for(&["a", "b", "c"])).unwrap();
        storage.write_all("/u/files/f", &wrapped_for(&["a"])).unwrap();

        let loaded = storage.load("/u/files/f").unwrap().unwrap();
        assert_eq!(loaded.recipients().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_empty_set_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileKeyStorage::new(dir.path());

        let err = storage.write_all("/u/files/f", &WrappedKeySet::new()).unwrap_err();
        assert!(matches!(err, CloakError::Persist(_)));
        assert!(storage.load("/u/files/f").unwrap().is_none());
    }
}
