//! Fields and behaviour shared by every persisted entity.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::policy::Policy;

/// Document field names of [`BaseDomain`].
pub mod fields {
    pub const ID: &str = "id";
    pub const POLICIES: &str = "policies";
    pub const DELETED: &str = "deleted";
    pub const DELETED_AT: &str = "deletedAt";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const USER_PERMISSIONS: &str = "userPermissions";
}

/// Common persisted state: identity, access policies, soft-delete flags and
/// audit timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseDomain {
    /// Assigned by the repository on first save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub policies: BTreeSet<Policy>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Permissions the current caller holds. Computed on read, never stored.
    #[serde(default)]
    pub user_permissions: BTreeSet<String>,
}

impl BaseDomain {
    /// Returns true if the entity was archived.
    pub fn is_archived(&self) -> bool {
        self.deleted || self.deleted_at.is_some()
    }
}

/// A type that can be stored by [`BaseRepository`](crate::db::BaseRepository).
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the entity is stored in.
    const COLLECTION: &'static str;

    /// Human-readable entity name used in errors and logs.
    const ENTITY_NAME: &'static str;

    fn base(&self) -> &BaseDomain;

    fn base_mut(&mut self) -> &mut BaseDomain;

    fn id(&self) -> Option<&str> {
        self.base().id.as_deref()
    }
}
