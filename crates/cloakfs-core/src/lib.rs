//! cloakfs-core: types, configuration and errors shared by every cloakfs crate

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{CloakError, CloakResult};
pub use types::{AccessList, AccessMode};
