//! Registry-backed `KeyStore` behavior across open/reload, plus the
//! augmentation contract: system keys only ever add recipients.

use cloakfs_core::config::KeysConfig;
use cloakfs_core::AccessList;
use cloakfs_crypto::{PublicKeyMap, RecipientKeyPair};
use cloakfs_keys::{KeyStore, RegistryKeyStore, SystemKeysConfig};
use proptest::prelude::*;

fn keys_config(root: &std::path::Path) -> KeysConfig {
    KeysConfig {
        key_root: root.to_path_buf(),
        registry_file: None,
        recovery_key_id: Some("recovery_1".into()),
        recovery_admin_enabled: true,
        public_share_key_id: Some("pubshare_1".into()),
    }
}

/// Store with user0..user7 enrolled (user0 opted in to recovery) plus both
/// system keys.
fn populated_store(root: &std::path::Path) -> RegistryKeyStore {
    let store = RegistryKeyStore::from_config(&keys_config(root)).unwrap();
    for i in 0..8 {
        store
            .enroll(&format!("user{i}"), RecipientKeyPair::generate().public_key())
            .unwrap();
    }
    store.enroll("recovery_1", RecipientKeyPair::generate().public_key()).unwrap();
    store.enroll("pubshare_1", RecipientKeyPair::generate().public_key()).unwrap();
    store.set_recovery_enabled("user0", true).unwrap();
    store
}

#[test]
fn from_config_uses_registry_under_key_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(dir.path());
    drop(store);

    assert!(dir.path().join("public-keys.json").exists());

    let reopened = RegistryKeyStore::from_config(&keys_config(dir.path())).unwrap();
    assert!(reopened.public_key("user3").is_ok());
    assert!(reopened.public_key("user9").unwrap_err().is_key_missing());
}

#[test]
fn public_recovery_file_gets_both_system_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(dir.path());

    let mut keys = PublicKeyMap::new();
    keys.insert("user0".into(), store.public_key("user0").unwrap());

    let list = AccessList::from_users(["user0"]).with_public(true);
    let out = store.add_system_keys(&list, keys, "user0").unwrap();

    let ids: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["pubshare_1", "recovery_1", "user0"]);
}

#[test]
fn defaults_add_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("public-keys.json");
    let store = RegistryKeyStore::open(&path, SystemKeysConfig::default()).unwrap();
    store.enroll("user1", RecipientKeyPair::generate().public_key()).unwrap();

    let mut keys = PublicKeyMap::new();
    keys.insert("user1".into(), store.public_key("user1").unwrap());

    let list = AccessList::from_users(["user1"]).with_public(true);
    let out = store.add_system_keys(&list, keys.clone(), "user1").unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out["user1"].as_bytes(), keys["user1"].as_bytes());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn augmentation_preserves_every_input_entry(
        members in proptest::collection::btree_set(0usize..8, 0..8),
        owner in 0usize..8,
        public in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path());

        let uids: Vec<String> = members.iter().map(|i| format!("user{i}")).collect();
        let mut keys = PublicKeyMap::new();
        for uid in &uids {
            keys.insert(uid.clone(), store.public_key(uid).unwrap());
        }

        let list = AccessList::from_users(uids.iter().map(String::as_str)).with_public(public);
        let out = store
            .add_system_keys(&list, keys.clone(), &format!("user{owner}"))
            .unwrap();

        prop_assert!(out.len() >= keys.len());
        for (uid, key) in &keys {
            prop_assert_eq!(out[uid].as_bytes(), key.as_bytes());
        }
        prop_assert_eq!(out.contains_key("pubshare_1"), public);
        prop_assert_eq!(out.contains_key("recovery_1"), owner == 0);
    }
}
