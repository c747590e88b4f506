//! Policy evaluation helpers shared by repositories and callers.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::Entity;
use crate::policy::{AclPermission, Policy};
use crate::user::User;

/// Generates, merges and evaluates access policies on entities.
///
/// Holds no per-request state; one instance is shared through an `Arc` by every
/// repository.
#[derive(Debug, Default)]
pub struct PolicyUtils {
    _private: (),
}

impl PolicyUtils {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one policy per permission (including implied permissions),
    /// each granted to `user`.
    pub fn generate_policies(&self, permissions: &[AclPermission], user: &User) -> BTreeSet<Policy> {
        let mut expanded: BTreeSet<AclPermission> = BTreeSet::new();
        for permission in permissions {
            expanded.insert(*permission);
            expanded.extend(permission.implied().iter().copied());
        }

        expanded
            .into_iter()
            .map(|p| Policy::new(p).with_user(user.username.clone()))
            .collect()
    }

    /// Merges `policies` into the entity's policies. Grantees of a policy with
    /// an already-present permission are unioned into it.
    pub fn add_policies_to_existing_object<T: Entity>(&self, object: &mut T, policies: &BTreeSet<Policy>) {
        let mut by_permission = Self::index(&object.base().policies);

        for policy in policies {
            let entry = by_permission
                .entry(policy.permission.clone())
                .or_insert_with(|| Policy {
                    permission: policy.permission.clone(),
                    users: BTreeSet::new(),
                    groups: BTreeSet::new(),
                });
            entry.users.extend(policy.users.iter().cloned());
            entry.groups.extend(policy.groups.iter().cloned());
        }

        object.base_mut().policies = by_permission.into_values().collect();
    }

    /// Removes the grantees in `policies` from the entity's policies. Policies
    /// left without grantees are dropped.
    pub fn remove_policies_from_existing_object<T: Entity>(
        &self,
        object: &mut T,
        policies: &BTreeSet<Policy>,
    ) {
        let mut by_permission = Self::index(&object.base().policies);

        for policy in policies {
            if let Some(existing) = by_permission.get_mut(&policy.permission) {
                existing.users.retain(|u| !policy.users.contains(u));
                existing.groups.retain(|g| !policy.groups.contains(g));
            }
        }

        object.base_mut().policies = by_permission
            .into_values()
            .filter(|p| !p.is_empty())
            .collect();
    }

    /// Returns true if any policy grants `permission` to `user`, directly or
    /// through one of the user's groups.
    pub fn is_permission_present_for_user(
        &self,
        policies: &BTreeSet<Policy>,
        permission: AclPermission,
        user: &User,
    ) -> bool {
        policies
            .iter()
            .any(|p| p.permission == permission.as_str() && Self::grants(p, user))
    }

    /// Returns every permission string `user` holds through `policies`.
    pub fn user_permissions(&self, policies: &BTreeSet<Policy>, user: &User) -> BTreeSet<String> {
        policies
            .iter()
            .filter(|p| Self::grants(p, user))
            .map(|p| p.permission.clone())
            .collect()
    }

    /// Populates the transient `user_permissions` of an entity for `user`.
    pub fn set_user_permissions_in_object<T: Entity>(&self, mut object: T, user: &User) -> T {
        let permissions = self.user_permissions(&object.base().policies, user);
        debug!(
            entity = T::ENTITY_NAME,
            id = object.id().unwrap_or_default(),
            user = %user.username,
            count = permissions.len(),
            "Computed user permissions"
        );
        object.base_mut().user_permissions = permissions;
        object
    }

    fn grants(policy: &Policy, user: &User) -> bool {
        policy.users.contains(&user.username)
            || policy.groups.iter().any(|g| user.group_ids.contains(g))
    }

    fn index(policies: &BTreeSet<Policy>) -> BTreeMap<String, Policy> {
        policies
            .iter()
            .map(|p| (p.permission.clone(), p.clone()))
            .collect()
    }
}
