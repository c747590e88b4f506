//! Access-control data models.
//!
//! Every persisted entity carries a set of [`Policy`] entries. Each policy names
//! one permission and the users and groups that hold it on that entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permissions that can be granted on a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclPermission {
    /// Full control: edit, archive and re-share the datasource.
    #[serde(rename = "manage:datasources")]
    ManageDatasources,
    /// View the datasource and its configuration.
    #[serde(rename = "read:datasources")]
    ReadDatasources,
    /// Run queries against the datasource.
    #[serde(rename = "execute:datasources")]
    ExecuteDatasources,
}

impl AclPermission {
    /// Returns all datasource permissions.
    pub fn all() -> [AclPermission; 3] {
        [
            AclPermission::ManageDatasources,
            AclPermission::ReadDatasources,
            AclPermission::ExecuteDatasources,
        ]
    }

    /// Returns the persisted string value of the permission.
    pub fn as_str(&self) -> &'static str {
        match self {
            AclPermission::ManageDatasources => "manage:datasources",
            AclPermission::ReadDatasources => "read:datasources",
            AclPermission::ExecuteDatasources => "execute:datasources",
        }
    }

    /// Parses a permission from its persisted string value.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "manage:datasources" => Some(AclPermission::ManageDatasources),
            "read:datasources" => Some(AclPermission::ReadDatasources),
            "execute:datasources" => Some(AclPermission::ExecuteDatasources),
            _ => None,
        }
    }

    /// Permissions that are granted alongside this one.
    pub fn implied(&self) -> &'static [AclPermission] {
        match self {
            AclPermission::ManageDatasources => &[
                AclPermission::ReadDatasources,
                AclPermission::ExecuteDatasources,
            ],
            AclPermission::ReadDatasources | AclPermission::ExecuteDatasources => &[],
        }
    }
}

impl std::fmt::Display for AclPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document field names of [`Policy`].
pub mod fields {
    pub const PERMISSION: &str = "permission";
    pub const USERS: &str = "users";
    pub const GROUPS: &str = "groups";
}

/// A grant of one permission to a set of users and groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Policy {
    /// Permission string, e.g. `read:datasources`.
    pub permission: String,
    /// Usernames holding the permission.
    #[serde(default)]
    pub users: BTreeSet<String>,
    /// Group ids holding the permission.
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl Policy {
    /// Creates a policy with no grantees.
    pub fn new(permission: AclPermission) -> Self {
        Self {
            permission: permission.as_str().to_string(),
            users: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Adds a user grantee.
    pub fn with_user(mut self, username: impl Into<String>) -> Self {
        self.users.insert(username.into());
        self
    }

    /// Adds a group grantee.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.groups.insert(group_id.into());
        self
    }

    /// Returns true if the policy grants nothing to anyone.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_round_trip_str() {
        for permission in AclPermission::all() {
            assert_eq!(
                AclPermission::from_str_value(permission.as_str()),
                Some(permission)
            );
        }
        assert_eq!(AclPermission::from_str_value("delete:datasources"), None);
    }

    #[test]
    fn test_permission_serde_matches_as_str() {
        let json = serde_json::to_value(AclPermission::ReadDatasources).unwrap();
        assert_eq!(json, serde_json::json!("read:datasources"));
    }

    #[test]
    fn test_manage_implies_read_and_execute() {
        let implied = AclPermission::ManageDatasources.implied();
        assert!(implied.contains(&AclPermission::ReadDatasources));
        assert!(implied.contains(&AclPermission::ExecuteDatasources));
        assert!(AclPermission::ReadDatasources.implied().is_empty());
    }

    #[test]
    fn test_policy_builder() {
        let policy = Policy::new(AclPermission::ReadDatasources)
            .with_user("ana@example.com")
            .with_group("eng");
        assert_eq!(policy.permission, "read:datasources");
        assert!(policy.users.contains("ana@example.com"));
        assert!(policy.groups.contains("eng"));
        assert!(!policy.is_empty());
        assert!(Policy::new(AclPermission::ReadDatasources).is_empty());
    }

    #[test]
    fn test_policy_document_fields() {
        let policy = Policy::new(AclPermission::ReadDatasources)
            .with_user("ana")
            .with_group("eng");
        let value = serde_json::to_value(&policy).unwrap();

        assert_eq!(value[fields::PERMISSION], "read:datasources");
        assert_eq!(value[fields::USERS][0], "ana");
        assert_eq!(value[fields::GROUPS][0], "eng");
    }
}
