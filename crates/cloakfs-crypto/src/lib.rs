//! cloakfs-crypto: primitives behind the write-path encryption orchestrator
//!
//! Key hierarchy:
//! ```text
//! Recipient X25519 keypair (per user, plus recovery / public-share system keys)
//!   └── Sealed content key (X25519 + XSalsa20-Poly1305, one envelope per recipient)
//!       └── File content key (per-file, 256-bit random)
//!           └── FileCipher: XChaCha20-Poly1305 per block, AAD binds block index and file id
//! ```

pub mod block;
pub mod envelope;
pub mod keys;

pub use block::{sealed_len, FileCipher, BLOCK_OVERHEAD};
pub use envelope::{
    decode_public_key, encode_public_key, multi_key_wrap, open_file_key, seal_file_key,
    RecipientKeyPair, SealedKey, WrappedKeySet,
};
pub use keys::{file_id_for_path, generate_file_key, FileKey};

/// X25519 public key of a recipient
pub use crypto_box::PublicKey;

/// Recipient id → public key, ordered so merges are deterministic
pub type PublicKeyMap = std::collections::BTreeMap<String, PublicKey>;

/// Size of a content key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
