//! `CipherEngine`: symmetric content encryption and key wrapping.
//!
//! `SealedCipherEngine` is the default implementation:
//!   - content keys are random per file unless an opened key is held
//!   - blocks are sealed with `cloakfs_crypto::FileCipher`
//!   - content keys are sealed per recipient (`cloakfs_crypto::envelope`)
//!   - wrapped key sets are stored through `FileKeyStorage`

use std::collections::HashMap;
use std::sync::RwLock;

use cloakfs_core::config::KeysConfig;
use cloakfs_core::{CloakError, CloakResult};
use cloakfs_crypto::{FileCipher, FileKey, PublicKeyMap, RecipientKeyPair, WrappedKeySet};
use cloakfs_keys::FileKeyStorage;
use tracing::debug;

pub trait CipherEngine: Send + Sync {
    /// Content key for `canonical_path`: the existing one if this engine
    /// holds it, otherwise a fresh key.
    fn content_key(&self, canonical_path: &str) -> CloakResult<FileKey>;

    /// Encrypt one block of plaintext. The result is self-contained
    /// (nonce and tag included).
    fn encrypt_block(
        &self,
        key: &FileKey,
        file_id: &[u8; 32],
        index: u64,
        plaintext: &[u8],
    ) -> CloakResult<Vec<u8>>;

    /// Seal `key` once for every entry of `recipients`.
    fn multi_key_wrap(&self, key: &FileKey, recipients: &PublicKeyMap)
        -> CloakResult<WrappedKeySet>;

    /// Replace the stored recipient set of `canonical_path` with `keys`,
    /// all or nothing.
    fn persist_all_file_keys(&self, canonical_path: &str, keys: &WrappedKeySet)
        -> CloakResult<()>;
}

/// Default engine.
///
/// Holds plaintext content keys only between `open_content_key` and the
/// next commit of the same file, so memory use tracks files being
/// rewritten, not files ever written.
pub struct SealedCipherEngine {
    storage: FileKeyStorage,
    opened: RwLock<HashMap<String, FileKey>>,
}

impl SealedCipherEngine {
    pub fn new(storage: FileKeyStorage) -> Self {
        Self {
            storage,
            opened: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &KeysConfig) -> Self {
        Self::new(FileKeyStorage::new(config.key_root.clone()))
    }

    pub fn storage(&self) -> &FileKeyStorage {
        &self.storage
    }

    /// Unwrap the stored content key of `canonical_path` with the secret key
    /// of `uid` and hold it for the next write of that file, which then
    /// keeps the key its existing versions are encrypted under.
    pub fn open_content_key(
        &self,
        canonical_path: &str,
        uid: &str,
        keypair: &RecipientKeyPair,
    ) -> CloakResult<FileKey> {
        let wrapped = self.storage.load(canonical_path)?.ok_or_else(|| {
            CloakError::KeyStore(format!("no file keys stored for {canonical_path}"))
        })?;
        let sealed = wrapped
            .get(uid)
            .ok_or_else(|| CloakError::KeyMissing(uid.to_string()))?;
        let key = cloakfs_crypto::open_file_key(sealed, keypair)
            .map_err(|e| CloakError::Cipher(format!("{e:#}")))?;

        self.held_mut()?.insert(canonical_path.to_string(), key.clone());
        Ok(key)
    }

    /// Release a held key without writing, e.g. after an aborted write.
    pub fn forget(&self, canonical_path: &str) -> CloakResult<bool> {
        Ok(self.held_mut()?.remove(canonical_path).is_some())
    }

    /// Number of plaintext content keys currently held
    pub fn cached_keys(&self) -> CloakResult<usize> {
        Ok(self
            .opened
            .read()
            .map_err(|_| CloakError::Cipher("content key cache lock poisoned".into()))?
            .len())
    }

    fn held_mut(&self) -> CloakResult<std::sync::RwLockWriteGuard<'_, HashMap<String, FileKey>>> {
        self.opened
            .write()
            .map_err(|_| CloakError::Cipher("content key cache lock poisoned".into()))
    }
}

impl CipherEngine for SealedCipherEngine {
    fn content_key(&self, canonical_path: &str) -> CloakResult<FileKey> {
        let held = self
            .opened
            .read()
            .map_err(|_| CloakError::Cipher("content key cache lock poisoned".into()))?
            .get(canonical_path)
            .cloned();
        Ok(held.unwrap_or_else(|| {
            debug!(path = %canonical_path, "generating content key");
            cloakfs_crypto::generate_file_key()
        }))
    }

    fn encrypt_block(
        &self,
        key: &FileKey,
        file_id: &[u8; 32],
        index: u64,
        plaintext: &[u8],
    ) -> CloakResult<Vec<u8>> {
        FileCipher::new(key, *file_id)
            .seal(index, plaintext)
            .map_err(|e| CloakError::Cipher(format!("{e:#}")))
    }

    fn multi_key_wrap(
        &self,
        key: &FileKey,
        recipients: &PublicKeyMap,
    ) -> CloakResult<WrappedKeySet> {
        cloakfs_crypto::multi_key_wrap(key, recipients)
            .map_err(|e| CloakError::Cipher(format!("{e:#}")))
    }

    /// Once the set is on disk the held key is released; the next write
    /// has to open it again.
    fn persist_all_file_keys(&self, canonical_path: &str, keys: &WrappedKeySet) -> CloakResult<()> {
        self.storage.write_all(canonical_path, keys)?;
        self.held_mut()?.remove(canonical_path);
        Ok(())
    }
}
