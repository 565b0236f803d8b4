//! File content encryption, one AEAD block at a time.
//!
//! A stored file is a sequence of sealed blocks, each covering at most
//! `block_size` plaintext bytes:
//! ```text
//! sealed block = nonce (24) | ciphertext | tag (16)
//! AAD          = block index (u64 BE) | file id (32)
//! ```
//! `FileCipher` binds one content key to one file id, so a block only opens
//! at the position and in the file it was sealed for.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::keys::{file_id_for_path, FileKey};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Bytes a sealed block adds on top of its plaintext
pub const BLOCK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Stored size of `plaintext_len` bytes split into `block_size` blocks.
pub fn sealed_len(plaintext_len: usize, block_size: usize) -> usize {
    let blocks = plaintext_len.div_ceil(block_size.max(1));
    plaintext_len + blocks * BLOCK_OVERHEAD
}

/// XChaCha20-Poly1305 keyed for the blocks of a single file.
pub struct FileCipher {
    aead: XChaCha20Poly1305,
    file_id: [u8; 32],
}

impl FileCipher {
    pub fn new(key: &FileKey, file_id: [u8; 32]) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(key.as_bytes().into()),
            file_id,
        }
    }

    /// Cipher for the file stored at `canonical_path`.
    pub fn for_path(key: &FileKey, canonical_path: &str) -> Self {
        Self::new(key, file_id_for_path(canonical_path))
    }

    pub fn file_id(&self) -> &[u8; 32] {
        &self.file_id
    }

    /// Seal the plaintext of block `index` under a fresh random nonce.
    pub fn seal(&self, index: u64, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let aad = self.aad(index);
        let body = self
            .aead
            .encrypt(&nonce, Payload { msg: plaintext, aad: &aad })
            .map_err(|_| anyhow::anyhow!("sealing block {index} failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + body.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&body);
        Ok(sealed)
    }

    /// Open block `index`. Fails on a wrong key, another file's block, a
    /// block moved to another position, or any modified byte.
    pub fn open(&self, index: u64, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
        if sealed.len() < BLOCK_OVERHEAD {
            anyhow::bail!(
                "block {index} is {} bytes, shorter than the {BLOCK_OVERHEAD}-byte envelope",
                sealed.len()
            );
        }
        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        let aad = self.aad(index);
        self.aead
            .decrypt(XNonce::from_slice(nonce), Payload { msg: body, aad: &aad })
            .map_err(|_| anyhow::anyhow!("block {index} does not authenticate for this file"))
    }

    /// Open a whole stored file: consecutive sealed blocks of `block_size`
    /// plaintext bytes each, the last one possibly shorter.
    pub fn open_all(&self, stored: &[u8], block_size: usize) -> anyhow::Result<Vec<u8>> {
        if block_size == 0 {
            anyhow::bail!("block size must be positive");
        }
        let mut plaintext = Vec::with_capacity(stored.len());
        for (index, sealed) in stored.chunks(block_size + BLOCK_OVERHEAD).enumerate() {
            plaintext.extend(self.open(index as u64, sealed)?);
        }
        Ok(plaintext)
    }

    fn aad(&self, index: u64) -> [u8; 40] {
        let mut aad = [0u8; 40];
        aad[..8].copy_from_slice(&index.to_be_bytes());
        aad[8..].copy_from_slice(&self.file_id);
        aad
    }
}
