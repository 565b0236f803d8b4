//! Full write path on disk: registry-backed key store, sealed cipher
//! engine, wrapped keys persisted under a temp key root, and every
//! recipient decrypting the result.

use std::sync::Arc;

use cloakfs_core::config::CloakConfig;
use cloakfs_core::AccessList;
use cloakfs_crypto::{open_file_key, FileCipher, FileKey, RecipientKeyPair};
use cloakfs_encryption::{EncryptionOrchestrator, SealedCipherEngine};
use cloakfs_keys::RegistryKeyStore;

struct Deployment {
    _dir: tempfile::TempDir,
    store: Arc<RegistryKeyStore>,
    engine: Arc<SealedCipherEngine>,
    config: CloakConfig,
}

fn deployment(block_size: usize) -> Deployment {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
[encryption]
block_size = {block_size}

[keys]
key_root = "{}"
recovery_key_id = "recovery_1"
recovery_admin_enabled = true
"#,
        dir.path().display()
    );
    let config = CloakConfig::parse(&toml).unwrap();
    let store = Arc::new(RegistryKeyStore::from_config(&config.keys).unwrap());
    let engine = Arc::new(SealedCipherEngine::from_config(&config.keys));
    Deployment {
        _dir: dir,
        store,
        engine,
        config,
    }
}

impl Deployment {
    fn orchestrator(&self) -> EncryptionOrchestrator {
        EncryptionOrchestrator::from_config(
            &self.config.encryption,
            self.store.clone(),
            self.engine.clone(),
        )
        .unwrap()
    }

    fn enroll(&self, uid: &str) -> RecipientKeyPair {
        let keypair = RecipientKeyPair::generate();
        self.store.enroll(uid, keypair.public_key()).unwrap();
        keypair
    }
}

fn decrypt_all(key: &FileKey, path: &str, ciphertext: &[u8], block_size: usize) -> Vec<u8> {
    FileCipher::for_path(key, path)
        .open_all(ciphertext, block_size)
        .unwrap()
}

#[test]
fn every_recipient_can_decrypt_committed_write() {
    let block_size = 16;
    let d = deployment(block_size);
    let user1 = d.enroll("user1");
    let user3 = d.enroll("user3");
    let recovery = d.enroll("recovery_1");
    d.store.set_recovery_enabled("user1", true).unwrap();

    let path = "/user1/files/notes/plan.md";
    let plaintext: Vec<u8> = (0..100u8).collect();

    let mut orch = d.orchestrator();
    orch.begin(path, "user1", "wb", AccessList::from_users(["user1", "user2", "user3"]))
        .unwrap();
    let mut ciphertext = Vec::new();
    for chunk in plaintext.chunks(7) {
        ciphertext.extend(orch.write(chunk).unwrap());
    }
    let done = orch.end(path).unwrap();
    ciphertext.extend(done.tail);

    assert_eq!(done.recipients, vec!["recovery_1", "user1", "user3"]);
    assert_eq!(done.skipped_recipients, vec!["user2"]);

    let stored = d.engine.storage().load(path).unwrap().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(!stored.contains("user2"));

    for (uid, keypair) in [("user1", &user1), ("user3", &user3), ("recovery_1", &recovery)] {
        let key = open_file_key(stored.get(uid).unwrap(), keypair).unwrap();
        assert_eq!(decrypt_all(&key, path, &ciphertext, block_size), plaintext, "{uid}");
    }
}

#[test]
fn owner_without_key_leaves_no_key_document() {
    let d = deployment(8192);
    d.enroll("user1");
    d.enroll("user3");

    let path = "/user2/files/foo.txt";
    let mut orch = d.orchestrator();
    orch.begin(path, "user2", "wb", AccessList::from_users(["user1", "user2", "user3"]))
        .unwrap();
    orch.write(b"contents").unwrap();

    assert!(orch.end(path).is_err());
    assert!(d.engine.storage().load(path).unwrap().is_none());
}

#[test]
fn rewrite_reuses_content_key_and_updates_recipients() {
    let d = deployment(8192);
    let user1 = d.enroll("user1");
    d.enroll("user3");
    let path = "/user1/files/shared.txt";

    let mut orch = d.orchestrator();
    orch.begin(path, "user1", "wb", AccessList::from_users(["user1", "user3"]))
        .unwrap();
    orch.end(path).unwrap();
    let first = open_file_key(
        d.engine.storage().load(path).unwrap().unwrap().get("user1").unwrap(),
        &user1,
    )
    .unwrap();
    assert_eq!(d.engine.cached_keys().unwrap(), 0);

    // Unshare from user3, write again through a version path. The owner
    // opens the existing key first so old versions stay readable.
    d.engine.open_content_key(path, "user1", &user1).unwrap();
    orch.begin(
        "/user1/files_versions/shared.txt.v17",
        "user1",
        "w",
        AccessList::from_users(["user1"]),
    )
    .unwrap();
    let done = orch.end(path).unwrap();
    assert_eq!(done.recipients, vec!["user1"]);

    let stored = d.engine.storage().load(path).unwrap().unwrap();
    assert_eq!(stored.recipients().collect::<Vec<_>>(), vec!["user1"]);
    let second = open_file_key(stored.get("user1").unwrap(), &user1).unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(d.engine.cached_keys().unwrap(), 0);
}

#[test]
fn rewrite_without_opening_rotates_content_key() {
    let d = deployment(8192);
    let user1 = d.enroll("user1");
    let path = "/user1/files/rotated.txt";
    let mut orch = d.orchestrator();

    let mut keys = Vec::new();
    for _ in 0..2 {
        orch.begin(path, "user1", "wb", AccessList::from_users(["user1"]))
            .unwrap();
        orch.end(path).unwrap();
        let stored = d.engine.storage().load(path).unwrap().unwrap();
        keys.push(open_file_key(stored.get("user1").unwrap(), &user1).unwrap());
    }
    assert_ne!(keys[0].as_bytes(), keys[1].as_bytes());
}

#[test]
fn many_commits_hold_no_plaintext_keys() {
    let d = deployment(64);
    d.enroll("user1");
    let mut orch = d.orchestrator();

    for i in 0..500 {
        let path = format!("/user1/files/batch/{i}.bin");
        orch.begin(&path, "user1", "wb", AccessList::from_users(["user1"]))
            .unwrap();
        orch.write(&[i as u8; 100]).unwrap();
        orch.end(&path).unwrap();
    }

    // An aborted write releases nothing and holds nothing either.
    let path = "/user2/files/orphan.bin";
    orch.begin(path, "user2", "wb", AccessList::from_users(["user2"]))
        .unwrap();
    orch.write(b"never committed").unwrap();
    assert!(orch.end(path).is_err());

    assert_eq!(d.engine.cached_keys().unwrap(), 0);
}

#[test]
fn invalid_layout_config_is_rejected() {
    let d = deployment(8192);
    let mut config = d.config.encryption.clone();
    config.versions_dir = config.files_dir.clone();

    let err = EncryptionOrchestrator::from_config(&config, d.store.clone(), d.engine.clone())
        .err()
        .unwrap();
    assert!(matches!(err, cloakfs_core::CloakError::Config(_)));

    config = d.config.encryption.clone();
    config.block_size = 0;
    assert!(EncryptionOrchestrator::from_config(&config, d.store.clone(), d.engine.clone()).is_err());
}

#[test]
fn empty_file_still_gets_keys() {
    let d = deployment(8192);
    let user1 = d.enroll("user1");
    let path = "/user1/files/empty";

    let mut orch = d.orchestrator();
    orch.begin(path, "user1", "wb", AccessList::from_users(["user1"]))
        .unwrap();
    let done = orch.end(path).unwrap();

    assert!(done.tail.is_empty());
    let stored = d.engine.storage().load(path).unwrap().unwrap();
    assert!(open_file_key(stored.get("user1").unwrap(), &user1).is_ok());
}
