use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CloakError, CloakResult};

/// Top-level configuration (loaded from cloakfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloakConfig {
    pub logging: LoggingConfig,
    pub encryption: EncryptionConfig,
    pub keys: KeysConfig,
}

impl CloakConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> CloakResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| CloakError::Config(format!("parsing config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> CloakResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| CloakError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CloakResult<()> {
        if self.encryption.block_size == 0 {
            return Err(CloakError::Config("encryption.block_size must be > 0".into()));
        }
        if self.encryption.files_dir.is_empty() || self.encryption.versions_dir.is_empty() {
            return Err(CloakError::Config(
                "encryption.files_dir and encryption.versions_dir must not be empty".into(),
            ));
        }
        if self.encryption.files_dir.contains('/') || self.encryption.versions_dir.contains('/') {
            return Err(CloakError::Config(
                "encryption.files_dir and encryption.versions_dir must be single path segments".into(),
            ));
        }
        if self.encryption.files_dir == self.encryption.versions_dir {
            return Err(CloakError::Config(
                "encryption.files_dir and encryption.versions_dir must differ".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Write-path encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Plaintext bytes per encrypted block (default: 8192)
    pub block_size: usize,
    /// Per-user directory holding live files
    pub files_dir: String,
    /// Per-user directory holding version copies
    pub versions_dir: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            block_size: 8192,
            files_dir: "files".into(),
            versions_dir: "files_versions".into(),
        }
    }
}

/// Key material locations and system recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Root directory for wrapped file keys
    pub key_root: PathBuf,
    /// Public key registry file (default: <key_root>/public-keys.json)
    pub registry_file: Option<PathBuf>,
    /// Registry id of the recovery key
    pub recovery_key_id: Option<String>,
    /// Admin switch for recovery; users must also opt in
    pub recovery_admin_enabled: bool,
    /// Registry id of the key used for public-link access
    pub public_share_key_id: Option<String>,
}

impl KeysConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.key_root.join("public-keys.json"))
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            key_root: PathBuf::from("~/.local/share/cloakfs/keys"),
            registry_file: None,
            recovery_key_id: None,
            recovery_admin_enabled: false,
            public_share_key_id: None,
        }
    }
}
