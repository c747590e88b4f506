//! Generic policy-aware repository.
//!
//! [`BaseRepository`] implements the storage behaviour every entity shares:
//! soft-delete filtering, permission checks through entity policies,
//! timestamping on save and per-caller permission annotation. Entity-specific
//! repositories wrap it and add their own finders.

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::operations::root_field;
use super::pagination::{PaginatedResult, Pagination};
use super::{Criteria, DbError, Document, DocumentConverter, DocumentOperations, Query, Sort, Update};
use crate::domain::{fields, Entity};
use crate::policy::{fields as policy_fields, AclPermission};
use crate::policy_utils::PolicyUtils;
use crate::user::User;

/// Fields `update_by_id` never writes.
const PROTECTED_FIELDS: &[&str] = &[
    fields::ID,
    fields::POLICIES,
    fields::CREATED_AT,
    fields::DELETED,
    fields::DELETED_AT,
    fields::UPDATED_AT,
];

/// Storage operations shared by all entity repositories.
pub struct BaseRepository<T: Entity> {
    operations: Arc<dyn DocumentOperations>,
    converter: Arc<DocumentConverter>,
    policy_utils: Arc<PolicyUtils>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for BaseRepository<T> {
    fn clone(&self) -> Self {
        Self {
            operations: Arc::clone(&self.operations),
            converter: Arc::clone(&self.converter),
            policy_utils: Arc::clone(&self.policy_utils),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> BaseRepository<T> {
    pub fn new(
        operations: Arc<dyn DocumentOperations>,
        converter: Arc<DocumentConverter>,
        policy_utils: Arc<PolicyUtils>,
    ) -> Self {
        Self {
            operations,
            converter,
            policy_utils,
            _entity: PhantomData,
        }
    }

    pub fn operations(&self) -> &Arc<dyn DocumentOperations> {
        &self.operations
    }

    pub fn converter(&self) -> &Arc<DocumentConverter> {
        &self.converter
    }

    pub fn policy_utils(&self) -> &Arc<PolicyUtils> {
        &self.policy_utils
    }

    /// Excludes archived documents.
    pub fn not_deleted() -> Criteria {
        Criteria::and(vec![
            Criteria::or(vec![
                Criteria::exists(fields::DELETED, false),
                Criteria::eq(fields::DELETED, false),
            ]),
            Criteria::eq(fields::DELETED_AT, Value::Null),
        ])
    }

    /// Matches documents with a policy granting `permission` to the user or to
    /// one of the user's groups.
    pub fn user_acl(user: &User, permission: AclPermission) -> Criteria {
        let mut grantee = vec![Criteria::eq(policy_fields::USERS, user.username.clone())];
        if !user.group_ids.is_empty() {
            grantee.push(Criteria::is_in(policy_fields::GROUPS, user.group_ids.iter().cloned()));
        }

        Criteria::elem_match(
            fields::POLICIES,
            Criteria::and(vec![
                Criteria::eq(policy_fields::PERMISSION, permission.as_str()),
                Criteria::or(grantee),
            ]),
        )
    }

    fn by_id(id: &str) -> Criteria {
        Criteria::eq(fields::ID, id)
    }

    /// Combines caller criteria with the soft-delete and ACL filters.
    fn restrict(criteria: Vec<Criteria>, permission: Option<AclPermission>, user: &User) -> Criteria {
        let mut all = criteria;
        all.push(Self::not_deleted());
        if let Some(permission) = permission {
            all.push(Self::user_acl(user, permission));
        }
        Criteria::and(all)
    }

    fn read_for_user(&self, doc: Document, user: &User) -> Result<T, DbError> {
        let entity: T = self.converter.read(doc)?;
        Ok(self.policy_utils.set_user_permissions_in_object(entity, user))
    }

    /// Populates the caller's permissions on an entity.
    pub fn set_user_permissions_in_object(&self, entity: T, user: &User) -> T {
        self.policy_utils.set_user_permissions_in_object(entity, user)
    }

    pub async fn find_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<T>, DbError> {
        self.query_one(vec![Self::by_id(id)], permission, user).await
    }

    /// Like `find_by_id`, but reports why nothing was returned:
    /// `AccessDenied` if the entity exists without the permission, otherwise
    /// `NotFound`.
    pub async fn get_by_id(
        &self,
        id: &str,
        permission: AclPermission,
        user: &User,
    ) -> Result<T, DbError> {
        if let Some(entity) = self.find_by_id(id, Some(permission), user).await? {
            return Ok(entity);
        }

        let exists = self
            .operations
            .count(T::COLLECTION, &Self::restrict(vec![Self::by_id(id)], None, user))
            .await?
            > 0;

        if exists {
            Err(DbError::AccessDenied {
                entity: T::ENTITY_NAME.to_string(),
                permission: permission.to_string(),
            })
        } else {
            Err(DbError::NotFound {
                entity: T::ENTITY_NAME.to_string(),
                id: id.to_string(),
            })
        }
    }

    pub async fn query_one(
        &self,
        criteria: Vec<Criteria>,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<T>, DbError> {
        let filter = Self::restrict(criteria, permission, user);
        match self.operations.find_one(T::COLLECTION, &filter).await? {
            Some(doc) => Ok(Some(self.read_for_user(doc, user)?)),
            None => Ok(None),
        }
    }

    pub async fn query_all(
        &self,
        criteria: Vec<Criteria>,
        permission: Option<AclPermission>,
        user: &User,
        sort: Sort,
    ) -> Result<Vec<T>, DbError> {
        let query = Query::new(Self::restrict(criteria, permission, user)).with_sort(sort);
        self.operations
            .find(T::COLLECTION, &query)
            .await?
            .into_iter()
            .map(|doc| self.read_for_user(doc, user))
            .collect()
    }

    /// Streams the results of `query_all`, one entity at a time.
    pub fn query_stream<'a>(
        &'a self,
        criteria: Vec<Criteria>,
        permission: Option<AclPermission>,
        user: &'a User,
        sort: Sort,
    ) -> BoxStream<'a, Result<T, DbError>> {
        let query = Query::new(Self::restrict(criteria, permission, user)).with_sort(sort);
        let load = async move { self.operations.find(T::COLLECTION, &query).await };

        stream::once(load)
            .map(move |result| match result {
                Ok(docs) => stream::iter(docs)
                    .map(move |doc| self.read_for_user(doc, user))
                    .left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            })
            .flatten()
            .boxed()
    }

    pub async fn query_page(
        &self,
        criteria: Vec<Criteria>,
        permission: Option<AclPermission>,
        user: &User,
        sort: Sort,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<T>, DbError> {
        let filter = Self::restrict(criteria, permission, user);
        let total = self.operations.count(T::COLLECTION, &filter).await?;

        let query = Query::new(filter)
            .with_sort(sort)
            .with_skip(pagination.offset())
            .with_limit(pagination.limit());
        let items = self
            .operations
            .find(T::COLLECTION, &query)
            .await?
            .into_iter()
            .map(|doc| self.read_for_user(doc, user))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResult::new(items, total, pagination))
    }

    pub async fn count(
        &self,
        criteria: Vec<Criteria>,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<u64, DbError> {
        self.operations
            .count(T::COLLECTION, &Self::restrict(criteria, permission, user))
            .await
    }

    /// Inserts or replaces the entity. Assigns an id and `createdAt` on first
    /// save and always refreshes `updatedAt`.
    pub async fn save(&self, entity: &T) -> Result<T, DbError> {
        let mut entity = entity.clone();
        let now = Utc::now();
        let base = entity.base_mut();

        let is_new = base.id.is_none();
        if is_new {
            base.id = Some(Uuid::new_v4().to_string());
        }
        if base.created_at.is_none() {
            base.created_at = Some(now);
        }
        base.updated_at = Some(now);

        let doc = self.converter.write(&entity)?;
        let saved = self.operations.save(T::COLLECTION, doc).await?;

        if is_new {
            info!(entity = T::ENTITY_NAME, id = entity.id().unwrap_or_default(), "Created");
        } else {
            debug!(entity = T::ENTITY_NAME, id = entity.id().unwrap_or_default(), "Saved");
        }
        self.converter.read(saved)
    }

    /// Applies the non-null `changes` to the entity with `id`. Keys may be
    /// dotted paths.
    ///
    /// Paths under identity, policies, timestamps, archive flags or transient
    /// fields are ignored. Returns `None` when no visible entity matched.
    pub async fn update_by_id(
        &self,
        id: &str,
        changes: Document,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<T>, DbError> {
        let mut update = Update::new();
        for (key, value) in changes {
            let root = root_field(&key);
            if value.is_null() || PROTECTED_FIELDS.contains(&root) || self.converter.is_transient(root) {
                continue;
            }
            update = update.set(key, value);
        }
        update = update.set(fields::UPDATED_AT, Utc::now().to_rfc3339());

        let filter = Self::restrict(vec![Self::by_id(id)], permission, user);
        let modified = self
            .operations
            .update_first(T::COLLECTION, &filter, &update)
            .await?;

        if modified == 0 {
            debug!(entity = T::ENTITY_NAME, id, "Update matched nothing");
            return Ok(None);
        }

        self.find_by_id(id, permission, user).await
    }

    /// Marks a stored entity as archived.
    pub async fn archive(&self, entity: &T) -> Result<T, DbError> {
        if entity.id().is_none() {
            return Err(DbError::Constraint(format!(
                "Cannot archive an unsaved {}",
                T::ENTITY_NAME
            )));
        }

        let mut entity = entity.clone();
        let base = entity.base_mut();
        base.deleted = true;
        base.deleted_at = Some(Utc::now());
        self.save(&entity).await
    }

    /// Archives the entity with `id` if it is visible to the user. Returns
    /// false when nothing matched.
    pub async fn archive_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let update = Update::new()
            .set(fields::DELETED, true)
            .set(fields::DELETED_AT, now.clone())
            .set(fields::UPDATED_AT, now);

        let filter = Self::restrict(vec![Self::by_id(id)], permission, user);
        let modified = self
            .operations
            .update_first(T::COLLECTION, &filter, &update)
            .await?;

        if modified > 0 {
            info!(entity = T::ENTITY_NAME, id, user = %user.username, "Archived");
        }
        Ok(modified > 0)
    }
}
