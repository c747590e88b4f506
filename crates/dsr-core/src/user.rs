//! The acting principal for repository calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A user on whose behalf repository operations run.
///
/// Policies grant permissions either to a username directly or to a group the
/// user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique login name (usually an email address).
    pub username: String,
    /// Identifiers of the groups the user is a member of.
    #[serde(default)]
    pub group_ids: BTreeSet<String>,
}

impl User {
    /// Creates a user without group memberships.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            group_ids: BTreeSet::new(),
        }
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_ids.insert(group_id.into());
        self
    }

    /// Returns true if the user belongs to the given group.
    pub fn in_group(&self, group_id: &str) -> bool {
        self.group_ids.contains(group_id)
    }
}
