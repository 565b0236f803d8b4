//! Public key registry: every identity that can receive a wrapped file key.
//!
//! Users and system recipients (recovery, public share) live in the same
//! list and are addressed by id.

use anyhow::{Context, Result};
use cloakfs_crypto::{decode_public_key, encode_public_key, PublicKey};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// An enrolled public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredKey {
    /// User id, or system key id
    pub uid: String,
    /// X25519 public key, base64
    pub public_key: String,
    /// First 16 hex chars of BLAKE3(public key)
    #[serde(default)]
    pub fingerprint: String,
    /// User opted in to having files wrapped for the recovery key
    #[serde(default)]
    pub recovery_enabled: bool,
    /// Unix timestamp of enrollment
    pub enrolled_at: u64,
    /// Revoked keys are never handed out
    pub revoked: bool,
}

impl RegisteredKey {
    pub fn decode(&self) -> Result<PublicKey> {
        decode_public_key(&self.public_key)
            .with_context(|| format!("decoding public key of {}", self.uid))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRegistry {
    pub keys: Vec<RegisteredKey>,
}

impl KeyRegistry {
    /// Load the registry from a JSON file; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading key registry: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing key registry: {}", path.display()))
    }

    /// Save atomically (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;

        let json = serde_json::to_string_pretty(self).context("serializing key registry")?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temp file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())
            .context("writing key registry temp file")?;
        tmp.persist(path)
            .map_err(|e| anyhow::anyhow!("replacing key registry {}: {e}", path.display()))?;
        Ok(())
    }

    /// Enroll (or replace) the public key for `uid`. Returns the fingerprint.
    ///
    /// Re-enrolling keeps the recovery preference and clears revocation.
    pub fn enroll(&mut self, uid: &str, public_key: &PublicKey) -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let fingerprint = fingerprint(public_key);

        match self.keys.iter_mut().find(|k| k.uid == uid) {
            Some(existing) => {
                existing.public_key = encode_public_key(public_key);
                existing.fingerprint = fingerprint.clone();
                existing.enrolled_at = now;
                existing.revoked = false;
            }
            None => self.keys.push(RegisteredKey {
                uid: uid.to_string(),
                public_key: encode_public_key(public_key),
                fingerprint: fingerprint.clone(),
                recovery_enabled: false,
                enrolled_at: now,
                revoked: false,
            }),
        }
        fingerprint
    }

    /// Revoke a key by id
    pub fn revoke(&mut self, uid: &str) -> bool {
        if let Some(key) = self.keys.iter_mut().find(|k| k.uid == uid) {
            key.revoked = true;
            true
        } else {
            false
        }
    }

    pub fn set_recovery_enabled(&mut self, uid: &str, enabled: bool) -> bool {
        if let Some(key) = self.keys.iter_mut().find(|k| k.uid == uid) {
            key.recovery_enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn find(&self, uid: &str) -> Option<&RegisteredKey> {
        self.keys.iter().find(|k| k.uid == uid)
    }

    /// The entry for `uid` unless it is absent or revoked
    pub fn find_active(&self, uid: &str) -> Option<&RegisteredKey> {
        self.find(uid).filter(|k| !k.revoked)
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &RegisteredKey> {
        self.keys.iter().filter(|k| !k.revoked)
    }
}

fn fingerprint(public_key: &PublicKey) -> String {
    blake3::hash(public_key.as_bytes()).to_hex().as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloakfs_crypto::RecipientKeyPair;

    #[test]
    fn test_enroll_and_find() {
        let mut reg = KeyRegistry::default();
        let kp = RecipientKeyPair::generate();
        let fp = reg.enroll("user1", kp.public_key());

        assert_eq!(fp.len(), 16);
        let entry = reg.find("user1").unwrap();
        assert_eq!(entry.fingerprint, fp);
        assert_eq!(entry.decode().unwrap().as_bytes(), kp.public_key().as_bytes());
        assert!(reg.find("user2").is_none());
    }

    #[test]
    fn test_reenroll_replaces_key_and_clears_revocation() {
        let mut reg = KeyRegistry::default();
        reg.enroll("user1", RecipientKeyPair::generate().public_key());
        reg.set_recovery_enabled("user1", true);
        reg.revoke("user1");

        let fresh = RecipientKeyPair::generate();
        reg.enroll("user1", fresh.public_key());

        assert_eq!(reg.keys.len(), 1);
        let entry = reg.find_active("user1").unwrap();
        assert!(entry.recovery_enabled);
        assert_eq!(entry.decode().unwrap().as_bytes(), fresh.public_key().as_bytes());
    }

    #[test]
    fn test_revoke_hides_key() {
        let mut reg = KeyRegistry::default();
        reg.enroll("old-user", RecipientKeyPair::generate().public_key());

        assert!(reg.revoke("old-user"));
        assert!(reg.find_active("old-user").is_none());
        assert_eq!(reg.active_keys().count(), 0);
        assert!(!reg.revoke("nonexistent"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/public-keys.json");

        let mut reg = KeyRegistry::default();
        reg.enroll("user1", RecipientKeyPair::generate().public_key());
        reg.enroll("recovery_1", RecipientKeyPair::generate().public_key());
        reg.set_recovery_enabled("user1", true);
        reg.save(&path).unwrap();

        let loaded = KeyRegistry::load(&path).unwrap();
        assert_eq!(loaded.keys, reg.keys);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = KeyRegistry::load(&dir.path().join("none.json")).unwrap();
        assert!(reg.keys.is_empty());
    }

    #[test]
    fn test_load_corrupt_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = KeyRegistry::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing key registry"));
    }
}
