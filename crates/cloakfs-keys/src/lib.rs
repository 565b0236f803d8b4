//! cloakfs-keys: where recipient public keys come from and where wrapped
//! file keys go
//!
//! - `registry`: JSON list of enrolled public keys (users and system keys)
//! - `store`: the `KeyStore` seam used by the orchestrator, backed by the registry
//! - `file_keys`: one wrapped-key document per canonical file path

pub mod file_keys;
pub mod registry;
pub mod store;

pub use file_keys::FileKeyStorage;
pub use registry::{KeyRegistry, RegisteredKey};
pub use store::{KeyStore, RegistryKeyStore, SystemKeysConfig};
