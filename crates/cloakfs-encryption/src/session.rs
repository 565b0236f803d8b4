//! State of one in-flight file write

use cloakfs_core::{AccessList, AccessMode, CloakResult};
use cloakfs_crypto::{file_id_for_path, FileKey};

use crate::engine::CipherEngine;

/// One write between `begin` and `end`.
///
/// Owned by the orchestrator; callers only get read access.
#[derive(Debug)]
pub struct FileWriteSession {
    path: String,
    owner: String,
    access_list: AccessList,
    mode: AccessMode,
    file_id: [u8; 32],
    buffer: Vec<u8>,
    next_block: u64,
    content_key: Option<FileKey>,
}

impl FileWriteSession {
    pub(crate) fn new(
        canonical_path: String,
        owner: &str,
        mode: AccessMode,
        access_list: AccessList,
    ) -> Self {
        Self {
            file_id: file_id_for_path(&canonical_path),
            path: canonical_path,
            owner: owner.to_string(),
            access_list,
            mode,
            buffer: Vec::new(),
            next_block: 0,
            content_key: None,
        }
    }

    /// Canonical path the session is bound to
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn access_list(&self) -> &AccessList {
        &self.access_list
    }

    pub fn mode(&self) -> &AccessMode {
        &self.mode
    }

    /// False for read-through passes, which never touch key material
    pub fn is_write(&self) -> bool {
        self.mode.is_write()
    }

    pub fn file_id(&self) -> &[u8; 32] {
        &self.file_id
    }

    /// Plaintext bytes waiting for a full block
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Index the next encrypted block will carry
    pub fn next_block_index(&self) -> u64 {
        self.next_block
    }

    pub fn has_content_key(&self) -> bool {
        self.content_key.is_some()
    }

    pub(crate) fn buffer(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Content key for this file, fetched from the engine on first use.
    pub(crate) fn content_key(&mut self, cipher: &dyn CipherEngine) -> CloakResult<&FileKey> {
        load_key(&mut self.content_key, &self.path, cipher)
    }

    /// Encrypt every full block in the buffer, plus the partial tail when
    /// `flush` is set. Returns the concatenated ciphertext blocks.
    pub(crate) fn seal_blocks(
        &mut self,
        cipher: &dyn CipherEngine,
        block_size: usize,
        flush: bool,
    ) -> CloakResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut consumed = 0;
        loop {
            let remaining = self.buffer.len() - consumed;
            if remaining == 0 || (remaining < block_size && !flush) {
                break;
            }
            let end = consumed + remaining.min(block_size);
            let key = load_key(&mut self.content_key, &self.path, cipher)?;
            let block = cipher.encrypt_block(
                key,
                &self.file_id,
                self.next_block,
                &self.buffer[consumed..end],
            )?;
            out.extend_from_slice(&block);
            consumed = end;
            self.next_block += 1;
        }
        self.buffer.drain(..consumed);
        Ok(out)
    }
}

fn load_key<'a>(
    slot: &'a mut Option<FileKey>,
    path: &str,
    cipher: &dyn CipherEngine,
) -> CloakResult<&'a FileKey> {
    let key = match slot.take() {
        Some(key) => key,
        None => cipher.content_key(path)?,
    };
    Ok(slot.insert(key))
}
