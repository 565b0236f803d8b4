//! `KeyStore`: recipient public key lookup and system-key augmentation

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use cloakfs_core::config::KeysConfig;
use cloakfs_core::{AccessList, CloakError, CloakResult};
use cloakfs_crypto::{PublicKey, PublicKeyMap};
use tracing::{debug, warn};

use crate::registry::KeyRegistry;

/// Source of recipient public keys.
///
/// Shared by every concurrent write session, hence `Send + Sync`.
pub trait KeyStore: Send + Sync {
    /// Public key of `uid`, or `CloakError::KeyMissing(uid)` when the user
    /// has none. Other errors mean the store itself is broken.
    fn public_key(&self, uid: &str) -> CloakResult<PublicKey>;

    /// Add system recipients (recovery, public share) to `keys`.
    ///
    /// The result must contain every entry of `keys` unchanged.
    fn add_system_keys(
        &self,
        access_list: &AccessList,
        keys: PublicKeyMap,
        owner: &str,
    ) -> CloakResult<PublicKeyMap>;
}

/// Which system recipients get a copy of every file key
#[derive(Debug, Clone, Default)]
pub struct SystemKeysConfig {
    pub recovery_key_id: Option<String>,
    pub recovery_admin_enabled: bool,
    pub public_share_key_id: Option<String>,
}

impl From<&KeysConfig> for SystemKeysConfig {
    fn from(config: &KeysConfig) -> Self {
        Self {
            recovery_key_id: config.recovery_key_id.clone(),
            recovery_admin_enabled: config.recovery_admin_enabled,
            public_share_key_id: config.public_share_key_id.clone(),
        }
    }
}

/// `KeyStore` backed by a JSON `KeyRegistry` file.
pub struct RegistryKeyStore {
    path: PathBuf,
    registry: RwLock<KeyRegistry>,
    system: SystemKeysConfig,
}

impl RegistryKeyStore {
    pub fn open(path: &Path, system: SystemKeysConfig) -> CloakResult<Self> {
        let registry = KeyRegistry::load(path).map_err(|e| CloakError::KeyStore(format!("{e:#}")))?;
        debug!(path = %path.display(), keys = registry.keys.len(), "key registry loaded");
        Ok(Self {
            path: path.to_path_buf(),
            registry: RwLock::new(registry),
            system,
        })
    }

    pub fn from_config(config: &KeysConfig) -> CloakResult<Self> {
        Self::open(&config.registry_path(), SystemKeysConfig::from(config))
    }

    /// Re-read the registry file, picking up keys enrolled by other processes.
    pub fn reload(&self) -> CloakResult<()> {
        let fresh = KeyRegistry::load(&self.path).map_err(|e| CloakError::KeyStore(format!("{e:#}")))?;
        *self.write_registry()? = fresh;
        Ok(())
    }

    /// Enroll `uid` and persist the registry. Returns the key fingerprint.
    pub fn enroll(&self, uid: &str, public_key: &PublicKey) -> CloakResult<String> {
        self.update(|reg| Ok(reg.enroll(uid, public_key)))
    }

    pub fn revoke(&self, uid: &str) -> CloakResult<bool> {
        self.update(|reg| Ok(reg.revoke(uid)))
    }

    pub fn set_recovery_enabled(&self, uid: &str, enabled: bool) -> CloakResult<bool> {
        self.update(|reg| Ok(reg.set_recovery_enabled(uid, enabled)))
    }

    fn update<T>(&self, f: impl FnOnce(&mut KeyRegistry) -> CloakResult<T>) -> CloakResult<T> {
        let mut registry = self.write_registry()?;
        let out = f(&mut *registry)?;
        registry
            .save(&self.path)
            .map_err(|e| CloakError::KeyStore(format!("{e:#}")))?;
        Ok(out)
    }

    fn write_registry(&self) -> CloakResult<std::sync::RwLockWriteGuard<'_, KeyRegistry>> {
        self.registry
            .write()
            .map_err(|_| CloakError::KeyStore("key registry lock poisoned".into()))
    }

    fn read_registry(&self) -> CloakResult<std::sync::RwLockReadGuard<'_, KeyRegistry>> {
        self.registry
            .read()
            .map_err(|_| CloakError::KeyStore("key registry lock poisoned".into()))
    }

    fn recovery_enabled_for(&self, uid: &str) -> CloakResult<bool> {
        Ok(self
            .read_registry()?
            .find_active(uid)
            .is_some_and(|k| k.recovery_enabled))
    }

    /// A configured system key must be enrolled; skipping it silently
    /// would lock recovery out of new files.
    fn system_key(&self, id: &str) -> CloakResult<PublicKey> {
        match self.public_key(id) {
            Err(CloakError::KeyMissing(_)) => Err(CloakError::KeyStore(format!(
                "system key {id} is configured but not enrolled"
            ))),
            other => other,
        }
    }
}

impl KeyStore for RegistryKeyStore {
    fn public_key(&self, uid: &str) -> CloakResult<PublicKey> {
        let registry = self.read_registry()?;
        let entry = registry
            .find_active(uid)
            .ok_or_else(|| CloakError::KeyMissing(uid.to_string()))?;
        entry
            .decode()
            .map_err(|e| CloakError::KeyStore(format!("{e:#}")))
    }

    fn add_system_keys(
        &self,
        access_list: &AccessList,
        mut keys: PublicKeyMap,
        owner: &str,
    ) -> CloakResult<PublicKeyMap> {
        if access_list.public {
            match &self.system.public_share_key_id {
                Some(id) => {
                    let key = self.system_key(id)?;
                    keys.entry(id.clone()).or_insert(key);
                }
                None => warn!("file is publicly shared but no public share key is configured"),
            }
        }

        if self.system.recovery_admin_enabled {
            if let Some(id) = &self.system.recovery_key_id {
                if self.recovery_enabled_for(owner)? {
                    let key = self.system_key(id)?;
                    keys.entry(id.clone()).or_insert(key);
                }
            }
        }

        Ok(keys)
    }
}
