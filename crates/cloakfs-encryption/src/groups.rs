use std::collections::BTreeMap;

use cloakfs_core::CloakResult;

/// Expands group ids from an access list into member user ids.
pub trait GroupResolver: Send + Sync {
    fn members(&self, group: &str) -> CloakResult<Vec<String>>;
}

/// Fixed group table, for deployments that sync group membership into
/// config and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<I, S>(mut self, group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(group.into(), members.into_iter().map(Into::into).collect());
        self
    }
}

impl GroupResolver for StaticGroups {
    /// Unknown groups have no members.
    fn members(&self, group: &str) -> CloakResult<Vec<String>> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }
}
