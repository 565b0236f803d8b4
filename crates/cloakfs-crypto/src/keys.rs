//! Per-file content keys and file identifiers

use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A per-file 256-bit content key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from an unwrapped slice, rejecting anything that is not
    /// exactly `KEY_SIZE` bytes.
    pub fn from_slice(slice: &[u8]) -> anyhow::Result<Self> {
        if slice.len() != KEY_SIZE {
            anyhow::bail!(
                "content key has wrong size: {} bytes (expected {})",
                slice.len(),
                KEY_SIZE
            );
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key.
pub fn generate_file_key() -> FileKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    FileKey::from_bytes(bytes)
}

/// 32-byte identifier bound into every block's AAD: BLAKE3 of the
/// canonical path. Version copies resolve to the same canonical path and
/// therefore share the id.
pub fn file_id_for_path(canonical_path: &str) -> [u8; 32] {
    *blake3::hash(canonical_path.as_bytes()).as_bytes()
}
