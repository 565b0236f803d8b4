//! Multi-recipient wrapping of content keys.
//!
//! Each recipient gets its own envelope: an ephemeral X25519 keypair is
//! generated per seal, the shared secret with the recipient's public key
//! keys an XSalsa20-Poly1305 box around the 32-byte content key.

use std::collections::BTreeMap;

use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::keys::FileKey;
use crate::PublicKeyMap;

const SALSA_NONCE_SIZE: usize = 24;

/// X25519 keypair held by a recipient (user or system key).
///
/// The secret half zeroizes itself on drop (crypto_box).
pub struct RecipientKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl RecipientKeyPair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let pair = Self::from_secret_bytes(bytes);
        bytes.zeroize();
        pair
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

impl std::fmt::Debug for RecipientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKeyPair")
            .field("public", &encode_public_key(&self.public))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A content key sealed for one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Ephemeral X25519 public key (sender side of DH)
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce
    pub nonce: [u8; SALSA_NONCE_SIZE],
    /// Encrypted content key + Poly1305 tag
    pub ciphertext: Vec<u8>,
}

/// Recipient id → sealed content key for a single file.
///
/// Same shape whether it holds one recipient or many.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeySet {
    entries: BTreeMap<String, SealedKey>,
}

impl WrappedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, recipient: impl Into<String>, sealed: SealedKey) {
        self.entries.insert(recipient.into(), sealed);
    }

    pub fn get(&self, recipient: &str) -> Option<&SealedKey> {
        self.entries.get(recipient)
    }

    pub fn contains(&self, recipient: &str) -> bool {
        self.entries.contains_key(recipient)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recipient ids in sorted order
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SealedKey)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Seal a content key for one recipient public key.
pub fn seal_file_key(file_key: &FileKey, recipient: &PublicKey) -> anyhow::Result<SealedKey> {
    let ephemeral = RecipientKeyPair::generate();
    let salsa_box = SalsaBox::new(recipient, &ephemeral.secret);

    let mut nonce = [0u8; SALSA_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = salsa_box
        .encrypt(
            crypto_box::Nonce::from_slice(&nonce),
            file_key.as_bytes().as_ref(),
        )
        .map_err(|e| anyhow::anyhow!("content key seal failed: {e}"))?;

    Ok(SealedKey {
        ephemeral_public_key: ephemeral.public_bytes(),
        nonce,
        ciphertext,
    })
}

/// Open a sealed content key with the recipient's keypair.
pub fn open_file_key(sealed: &SealedKey, recipient: &RecipientKeyPair) -> anyhow::Result<FileKey> {
    let ephemeral_pk = PublicKey::from(sealed.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, &recipient.secret);

    let mut plaintext = salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_ref(),
        )
        .map_err(|_| anyhow::anyhow!("content key open failed (wrong key or tampered data)"))?;

    let key = FileKey::from_slice(&plaintext);
    plaintext.zeroize();
    key
}

/// Seal `file_key` once per entry of `recipients`.
///
/// An empty recipient map is refused: a content key nobody can unwrap
/// would make the file unreadable.
pub fn multi_key_wrap(file_key: &FileKey, recipients: &PublicKeyMap) -> anyhow::Result<WrappedKeySet> {
    if recipients.is_empty() {
        anyhow::bail!("refusing to wrap content key for zero recipients");
    }

    let mut set = WrappedKeySet::new();
    for (uid, public_key) in recipients {
        let sealed = seal_file_key(file_key, public_key)
            .map_err(|e| anyhow::anyhow!("wrapping for {uid}: {e}"))?;
        set.insert(uid.clone(), sealed);
    }
    Ok(set)
}

/// Base64 (standard alphabet) form used in key registries.
pub fn encode_public_key(key: &PublicKey) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(key.as_bytes())
}

pub fn decode_public_key(encoded: &str) -> anyhow::Result<PublicKey> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow::anyhow!("base64 decode: {e}"))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("public key has wrong size: {} bytes (expected 32)", bytes.len()))?;
    Ok(PublicKey::from(bytes))
}
