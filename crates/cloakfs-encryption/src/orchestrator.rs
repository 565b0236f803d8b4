//! Write lifecycle: `begin` → `write`* → `end`.
//!
//! `end` decides who can read the file:
//!   1. the owner, every listed user, and the members of every listed group
//!   2. minus users without a public key (logged, reported in `Finalized`)
//!   3. plus system recipients from the key store
//!
//! and commits the wrapped content key for all of them. An owner without a
//! public key aborts the write: committing would produce a file its own
//! owner cannot decrypt.

use std::collections::BTreeSet;
use std::sync::Arc;

use cloakfs_core::config::EncryptionConfig;
use cloakfs_core::{AccessList, AccessMode, CloakError, CloakResult};
use cloakfs_crypto::PublicKeyMap;
use cloakfs_keys::KeyStore;
use tracing::{debug, info, warn};

use crate::engine::CipherEngine;
use crate::groups::GroupResolver;
use crate::path::PathLayout;
use crate::session::FileWriteSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    WriteActive,
    /// Inside `end`. Only observable if a collaborator panicked mid-`end`,
    /// which leaves the orchestrator unusable.
    Finalizing,
}

/// Terminal outcome of the most recent session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed,
    Aborted,
}

/// Result of a committed `end`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finalized {
    /// Ciphertext of the buffered tail, to append after the blocks
    /// returned by `write`
    pub tail: Vec<u8>,
    /// Every id the content key was wrapped for, system keys included.
    /// Empty for read-through sessions.
    pub recipients: Vec<String>,
    /// Users dropped because they have no public key
    pub skipped_recipients: Vec<String>,
}

pub struct EncryptionOrchestrator {
    key_store: Arc<dyn KeyStore>,
    cipher: Arc<dyn CipherEngine>,
    groups: Option<Arc<dyn GroupResolver>>,
    layout: PathLayout,
    block_size: usize,
    state: WriteState,
    session: Option<FileWriteSession>,
    last_outcome: Option<WriteOutcome>,
}

impl EncryptionOrchestrator {
    /// Orchestrator with the default layout and block size.
    pub fn new(key_store: Arc<dyn KeyStore>, cipher: Arc<dyn CipherEngine>) -> Self {
        Self {
            key_store,
            cipher,
            groups: None,
            layout: PathLayout::default(),
            block_size: EncryptionConfig::default().block_size,
            state: WriteState::Idle,
            session: None,
            last_outcome: None,
        }
    }

    /// Fails with `CloakError::Config` on a zero block size or a layout
    /// whose files and versions directories are not two distinct segments.
    pub fn from_config(
        config: &EncryptionConfig,
        key_store: Arc<dyn KeyStore>,
        cipher: Arc<dyn CipherEngine>,
    ) -> CloakResult<Self> {
        if config.block_size == 0 {
            return Err(CloakError::Config("encryption.block_size must be > 0".into()));
        }
        let layout = PathLayout::try_from(config)?;
        Ok(Self::new(key_store, cipher)
            .with_layout(layout)
            .with_block_size(config.block_size))
    }

    pub fn with_layout(mut self, layout: PathLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_group_resolver(mut self, groups: Arc<dyn GroupResolver>) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Plaintext bytes per block. Zero is treated as one.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    pub fn session(&self) -> Option<&FileWriteSession> {
        self.session.as_ref()
    }

    pub fn last_outcome(&self) -> Option<WriteOutcome> {
        self.last_outcome
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Start a session for `path`. No cryptographic work happens here.
    pub fn begin(
        &mut self,
        path: &str,
        owner: &str,
        mode: impl Into<AccessMode>,
        access_list: AccessList,
    ) -> CloakResult<()> {
        if self.state != WriteState::Idle {
            return Err(CloakError::ProtocolViolation(format!(
                "begin({path}) while a session is {:?}",
                self.state
            )));
        }
        if path.is_empty() {
            return Err(CloakError::ProtocolViolation("begin with an empty path".into()));
        }
        if owner.is_empty() {
            return Err(CloakError::ProtocolViolation(format!(
                "begin({path}) without an owner"
            )));
        }

        let canonical = self.layout.resolve(path);
        let session = FileWriteSession::new(canonical, owner, mode.into(), access_list);
        debug!(
            path = %session.path(),
            owner = %owner,
            mode = %session.mode().as_str(),
            write = session.is_write(),
            "session begun"
        );
        self.session = Some(session);
        self.state = WriteState::WriteActive;
        Ok(())
    }

    /// Buffer plaintext and return the ciphertext of every block it
    /// completes. A cipher failure aborts the session.
    ///
    /// Returned blocks only become readable once `end` commits the file
    /// keys. If a later `write` or `end` fails, no key for them is stored
    /// and the caller must discard every block this session returned.
    pub fn write(&mut self, data: &[u8]) -> CloakResult<Vec<u8>> {
        let session = match (&self.state, self.session.as_mut()) {
            (WriteState::WriteActive, Some(session)) => session,
            _ => {
                return Err(CloakError::ProtocolViolation(format!(
                    "write while {:?}",
                    self.state
                )))
            }
        };
        if !session.is_write() {
            return Err(CloakError::ProtocolViolation(format!(
                "write on {} opened with mode {:?}",
                session.path(),
                session.mode().as_str()
            )));
        }

        session.buffer(data);
        match session.seal_blocks(self.cipher.as_ref(), self.block_size, false) {
            Ok(blocks) => Ok(blocks),
            Err(e) => {
                self.finish(WriteOutcome::Aborted);
                Err(e)
            }
        }
    }

    /// Close the session opened for `path`, committing the wrapped content
    /// key for every reachable recipient. The session is gone afterwards
    /// whatever the outcome.
    pub fn end(&mut self, path: &str) -> CloakResult<Finalized> {
        let mut session = match (&self.state, self.session.take()) {
            (WriteState::WriteActive, Some(session)) => session,
            (_, session) => {
                self.session = session;
                return Err(CloakError::ProtocolViolation(format!(
                    "end({path}) while {:?}",
                    self.state
                )));
            }
        };

        self.state = WriteState::Finalizing;
        let result = self.finalize(&mut session, path);
        self.finish(if result.is_ok() {
            WriteOutcome::Committed
        } else {
            WriteOutcome::Aborted
        });

        match &result {
            Ok(done) if session.is_write() => info!(
                path = %session.path(),
                owner = %session.owner(),
                recipients = done.recipients.len(),
                skipped = done.skipped_recipients.len(),
                blocks = session.next_block_index(),
                "file keys committed"
            ),
            Ok(_) => debug!(path = %session.path(), "read-through session closed"),
            Err(e) => debug!(path = %session.path(), error = %e, "session aborted"),
        }
        result
    }

    fn finish(&mut self, outcome: WriteOutcome) {
        self.session = None;
        self.state = WriteState::Idle;
        self.last_outcome = Some(outcome);
    }

    fn finalize(&self, session: &mut FileWriteSession, path: &str) -> CloakResult<Finalized> {
        let resolved = self.layout.resolve(path);
        if resolved != session.path() {
            return Err(CloakError::ProtocolViolation(format!(
                "end({path}) resolves to {resolved} but the session is for {}",
                session.path()
            )));
        }

        if !session.is_write() {
            return Ok(Finalized::default());
        }

        let (resolved_keys, skipped) = self.resolve_recipients(session)?;

        let keys = self.key_store.add_system_keys(
            session.access_list(),
            resolved_keys.clone(),
            session.owner(),
        )?;
        check_superset(&resolved_keys, &keys)?;

        let cipher = self.cipher.as_ref();
        let tail = session.seal_blocks(cipher, self.block_size, true)?;
        let wrapped = cipher.multi_key_wrap(session.content_key(cipher)?, &keys)?;
        cipher.persist_all_file_keys(session.path(), &wrapped)?;

        Ok(Finalized {
            tail,
            recipients: wrapped.recipients().map(String::from).collect(),
            skipped_recipients: skipped,
        })
    }

    /// Public keys of every user entitled to the file, and the users
    /// skipped for having none. Fails if the owner is among the skipped.
    fn resolve_recipients(
        &self,
        session: &FileWriteSession,
    ) -> CloakResult<(PublicKeyMap, Vec<String>)> {
        let owner = session.owner();
        let mut keys = PublicKeyMap::new();
        let mut skipped = Vec::new();
        let mut owner_missing = false;

        for uid in self.candidates(session)? {
            match self.key_store.public_key(&uid) {
                Ok(key) => {
                    keys.insert(uid, key);
                }
                Err(CloakError::KeyMissing(_)) if uid == owner => owner_missing = true,
                Err(CloakError::KeyMissing(_)) => {
                    warn!(
                        path = %session.path(),
                        uid = %uid,
                        "no public key for recipient, file will not be readable by them"
                    );
                    skipped.push(uid);
                }
                Err(e) => return Err(e),
            }
        }

        if owner_missing {
            return Err(CloakError::OwnerKeyMissing(owner.to_string()));
        }
        Ok((keys, skipped))
    }

    /// Owner first, then listed users, then group members; each id once.
    fn candidates(&self, session: &FileWriteSession) -> CloakResult<Vec<String>> {
        let list = session.access_list();
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut push = |uid: &str| {
            if seen.insert(uid.to_string()) {
                out.push(uid.to_string());
            }
        };

        push(session.owner());
        list.users.iter().for_each(|uid| push(uid.as_str()));

        if !list.groups.is_empty() {
            match &self.groups {
                Some(resolver) => {
                    for group in &list.groups {
                        resolver.members(group)?.iter().for_each(|uid| push(uid.as_str()));
                    }
                }
                None => warn!(
                    path = %session.path(),
                    groups = list.groups.len(),
                    "access list names groups but no group resolver is configured"
                ),
            }
        }
        Ok(out)
    }
}

/// System-key augmentation may only add recipients.
fn check_superset(before: &PublicKeyMap, after: &PublicKeyMap) -> CloakResult<()> {
    for (uid, key) in before {
        match after.get(uid) {
            Some(kept) if kept.as_bytes() == key.as_bytes() => {}
            Some(_) => {
                return Err(CloakError::KeyStore(format!(
                    "system key augmentation replaced the key of {uid}"
                )))
            }
            None => {
                return Err(CloakError::KeyStore(format!(
                    "system key augmentation dropped recipient {uid}"
                )))
            }
        }
    }
    Ok(())
}
