use thiserror::Error;

pub type CloakResult<T> = Result<T, CloakError>;

#[derive(Debug, Error)]
pub enum CloakError {
    /// A recipient has no usable public key. Recoverable unless the
    /// recipient owns the file.
    #[error("public key missing for user {0}")]
    KeyMissing(String),

    /// The file owner has no usable public key; the write must not commit.
    #[error("public key missing for file owner {0}")]
    OwnerKeyMissing(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("key persistence failed: {0}")]
    Persist(String),

    /// Lifecycle methods were called out of order (caller bug).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloakError {
    /// Whether the orchestrator may recover from this error by skipping
    /// the recipient it concerns.
    pub fn is_key_missing(&self) -> bool {
        matches!(self, CloakError::KeyMissing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CloakError::KeyMissing("user2".into()).to_string(),
            "public key missing for user user2"
        );
        assert_eq!(
            CloakError::OwnerKeyMissing("user2".into()).to_string(),
            "public key missing for file owner user2"
        );
        assert_eq!(
            CloakError::ProtocolViolation("write before begin".into()).to_string(),
            "protocol violation: write before begin"
        );
    }

    #[test]
    fn test_only_key_missing_is_recoverable() {
        assert!(CloakError::KeyMissing("a".into()).is_key_missing());
        assert!(!CloakError::OwnerKeyMissing("a".into()).is_key_missing());
        assert!(!CloakError::Cipher("boom".into()).is_key_missing());
        assert!(!CloakError::KeyStore("corrupt".into()).is_key_missing());
    }

    #[test]
    fn test_anyhow_conversion_is_transparent() {
        let err: CloakError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(err.to_string(), "disk on fire");
    }
}
