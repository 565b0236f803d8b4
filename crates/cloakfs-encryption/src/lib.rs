//! cloakfs-encryption: encrypts files as they are written and wraps their
//! content keys for everyone allowed to read them
//!
//! - `orchestrator`: the `begin`/`write`/`end` lifecycle and recipient policy
//! - `session`: state of one in-flight write
//! - `engine`: the `CipherEngine` seam and its default implementation
//! - `path`: version paths → canonical paths
//! - `groups`: optional group expansion for access lists

pub mod engine;
pub mod groups;
pub mod orchestrator;
pub mod path;
pub mod session;

pub use engine::{CipherEngine, SealedCipherEngine};
pub use groups::{GroupResolver, StaticGroups};
pub use orchestrator::{EncryptionOrchestrator, Finalized, WriteOutcome, WriteState};
pub use path::PathLayout;
pub use session::FileWriteSession;
