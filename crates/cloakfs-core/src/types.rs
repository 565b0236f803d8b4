use serde::{Deserialize, Serialize};

/// Identities allowed to read a file, as supplied by the sharing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessList {
    /// User ids with direct access (owner included)
    pub users: Vec<String>,
    /// Group ids, expanded to users before key lookup
    pub groups: Vec<String>,
    /// Whether the file is reachable through a public link
    pub public: bool,
}

impl AccessList {
    pub fn from_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn contains_user(&self, uid: &str) -> bool {
        self.users.iter().any(|u| u == uid)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && !self.public
    }
}

/// How a file was opened, parsed from an fopen-style mode string
/// (`"r"`, `"wb"`, `"w+"`, `"a"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMode {
    raw: String,
}

impl AccessMode {
    pub fn new(mode: impl Into<String>) -> Self {
        Self { raw: mode.into() }
    }

    pub fn read() -> Self {
        Self::new("r")
    }

    pub fn write() -> Self {
        Self::new("wb")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True for truncating write modes, the only modes that produce new
    /// content and therefore need fresh key material. Append and `r+`
    /// modes are passed through.
    pub fn is_write(&self) -> bool {
        matches!(self.raw.as_str(), "w" | "wb" | "w+" | "wb+" | "w+b")
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        Self::read()
    }
}

impl From<&str> for AccessMode {
    fn from(mode: &str) -> Self {
        Self::new(mode)
    }
}
