//! Datasource repository.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::pagination::{PaginatedResult, Pagination};
use super::{BaseRepository, Criteria, DbError, Document, DocumentConverter, DocumentOperations, Sort};
use crate::datasource::{fields, Datasource, DatasourceConfiguration};
use crate::policy::AclPermission;
use crate::policy_utils::PolicyUtils;
use crate::user::User;

/// Partial update for a datasource.
#[derive(Debug, Clone, Default)]
pub struct DatasourceUpdate {
    pub name: Option<String>,
    pub template_name: Option<String>,
    /// Replaces the whole configuration when set.
    pub datasource_configuration: Option<DatasourceConfiguration>,
}

impl DatasourceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.template_name.is_none() && self.datasource_configuration.is_none()
    }

    /// Applies the update to an in-memory datasource.
    pub fn apply_to(&self, datasource: &mut Datasource) {
        if let Some(name) = &self.name {
            datasource.name = name.clone();
        }
        if let Some(template_name) = &self.template_name {
            datasource.template_name = Some(template_name.clone());
        }
        if let Some(configuration) = &self.datasource_configuration {
            datasource.datasource_configuration = Some(configuration.clone());
        }
    }
}

/// Repository trait for datasource persistence.
///
/// `permission` restricts results to datasources whose policies grant it to
/// `user`; `None` skips the check. Archived datasources are never returned.
#[async_trait]
pub trait DatasourceRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError>;

    /// Lists an organization's datasources ordered by name.
    async fn find_all_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Vec<Datasource>, DbError>;

    async fn find_by_name_and_organization_id(
        &self,
        name: &str,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError>;

    async fn find_all_by_ids(
        &self,
        ids: &[String],
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Vec<Datasource>, DbError>;

    async fn find_page_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Datasource>, DbError>;

    async fn count_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<u64, DbError>;

    /// Inserts or replaces a datasource.
    async fn save(&self, datasource: &Datasource) -> Result<Datasource, DbError>;

    /// Applies a partial update and recomputes validity. Returns `None` when
    /// the datasource is missing, archived or not permitted.
    async fn update_by_id(
        &self,
        id: &str,
        update: &DatasourceUpdate,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError>;

    /// Archives a datasource. Returns false when nothing matched.
    async fn archive_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<bool, DbError>;
}

/// [`DatasourceRepository`] over a [`BaseRepository`].
pub struct DatasourceRepositoryImpl {
    base: BaseRepository<Datasource>,
    policy_utils: Arc<PolicyUtils>,
}

impl DatasourceRepositoryImpl {
    /// The same `policy_utils` instance is handed to the base repository and
    /// kept here.
    pub fn new(
        operations: Arc<dyn DocumentOperations>,
        converter: Arc<DocumentConverter>,
        policy_utils: Arc<PolicyUtils>,
    ) -> Self {
        Self {
            base: BaseRepository::new(operations, converter, Arc::clone(&policy_utils)),
            policy_utils,
        }
    }

    pub fn base(&self) -> &BaseRepository<Datasource> {
        &self.base
    }

    pub fn policy_utils(&self) -> &Arc<PolicyUtils> {
        &self.policy_utils
    }

    fn in_organization(organization_id: &str) -> Criteria {
        Criteria::eq(fields::ORGANIZATION_ID, organization_id)
    }
}

#[async_trait]
impl DatasourceRepository for DatasourceRepositoryImpl {
    async fn find_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError> {
        self.base.find_by_id(id, permission, user).await
    }

    async fn find_all_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Vec<Datasource>, DbError> {
        self.base
            .query_all(
                vec![Self::in_organization(organization_id)],
                permission,
                user,
                Sort::asc(fields::NAME),
            )
            .await
    }

    async fn find_by_name_and_organization_id(
        &self,
        name: &str,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError> {
        self.base
            .query_one(
                vec![
                    Criteria::eq(fields::NAME, name),
                    Self::in_organization(organization_id),
                ],
                permission,
                user,
            )
            .await
    }

    async fn find_all_by_ids(
        &self,
        ids: &[String],
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Vec<Datasource>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.base
            .query_all(
                vec![Criteria::is_in(crate::domain::fields::ID, ids.iter().cloned())],
                permission,
                user,
                Sort::asc(fields::NAME),
            )
            .await
    }

    async fn find_page_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Datasource>, DbError> {
        self.base
            .query_page(
                vec![Self::in_organization(organization_id)],
                permission,
                user,
                Sort::asc(fields::NAME),
                pagination,
            )
            .await
    }

    async fn count_by_organization_id(
        &self,
        organization_id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<u64, DbError> {
        self.base
            .count(vec![Self::in_organization(organization_id)], permission, user)
            .await
    }

    async fn save(&self, datasource: &Datasource) -> Result<Datasource, DbError> {
        self.base.save(datasource).await
    }

    async fn update_by_id(
        &self,
        id: &str,
        update: &DatasourceUpdate,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<Option<Datasource>, DbError> {
        let Some(mut current) = self.base.find_by_id(id, permission, user).await? else {
            return Ok(None);
        };

        update.apply_to(&mut current);
        current.refresh_validity();

        let converter = self.base.converter();
        let written = converter.write(&current)?;
        let changes: Document = [
            fields::NAME,
            fields::TEMPLATE_NAME,
            fields::DATASOURCE_CONFIGURATION,
            fields::INVALIDS,
            fields::IS_VALID,
        ]
        .into_iter()
        .filter_map(|key| written.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();

        debug!(id, valid = current.is_valid, "Updating datasource");
        self.base.update_by_id(id, changes, permission, user).await
    }

    async fn archive_by_id(
        &self,
        id: &str,
        permission: Option<AclPermission>,
        user: &User,
    ) -> Result<bool, DbError> {
        self.base.archive_by_id(id, permission, user).await
    }
}

/// Creates a datasource repository over the given collaborators.
pub fn create_datasource_repository(
    operations: Arc<dyn DocumentOperations>,
    converter: Arc<DocumentConverter>,
    policy_utils: Arc<PolicyUtils>,
) -> Arc<dyn DatasourceRepository> {
    Arc::new(DatasourceRepositoryImpl::new(operations, converter, policy_utils))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDocumentStore;
    use crate::domain::Entity;

    fn collaborators() -> (Arc<dyn DocumentOperations>, Arc<DocumentConverter>, Arc<PolicyUtils>) {
        (
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(DocumentConverter::new()),
            Arc::new(PolicyUtils::new()),
        )
    }

    #[test]
    fn test_policy_utils_shared_with_base() {
        let (operations, converter, policy_utils) = collaborators();
        let repo = DatasourceRepositoryImpl::new(operations, converter, Arc::clone(&policy_utils));

        assert!(Arc::ptr_eq(repo.policy_utils(), &policy_utils));
        assert!(Arc::ptr_eq(repo.base().policy_utils(), repo.policy_utils()));
    }

    #[test]
    fn test_collaborators_passed_through() {
        let (operations, converter, policy_utils) = collaborators();
        let repo = DatasourceRepositoryImpl::new(
            Arc::clone(&operations),
            Arc::clone(&converter),
            policy_utils,
        );

        assert!(Arc::ptr_eq(repo.base().operations(), &operations));
        assert!(Arc::ptr_eq(repo.base().converter(), &converter));
    }

    #[test]
    fn test_datasource_update_apply() {
        let mut ds = Datasource::new("Users API", "restapi-plugin", "org-1");
        let update = DatasourceUpdate {
            name: Some("Orders API".to_string()),
            datasource_configuration: Some(DatasourceConfiguration {
                url: Some("https://orders.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(!update.is_empty());
        update.apply_to(&mut ds);
        assert_eq!(ds.name, "Orders API");
        assert_eq!(ds.url(), Some("https://orders.example.com"));
        assert!(DatasourceUpdate::default().is_empty());
    }

    #[tokio::test]
    async fn test_update_recomputes_validity() {
        let (operations, converter, policy_utils) = collaborators();
        let repo = DatasourceRepositoryImpl::new(operations, converter, Arc::clone(&policy_utils));
        let ana = User::new("ana@example.com");

        let mut ds = Datasource::new("Users API", "restapi-plugin", "org-1");
        ds.base.policies = policy_utils.generate_policies(&[AclPermission::ManageDatasources], &ana);
        ds.refresh_validity();
        assert!(!ds.is_valid);
        let saved = repo.save(&ds).await.unwrap();

        let update = DatasourceUpdate {
            datasource_configuration: Some(DatasourceConfiguration {
                url: Some("https://api.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = repo
            .update_by_id(
                saved.id().unwrap(),
                &update,
                Some(AclPermission::ManageDatasources),
                &ana,
            )
            .await
            .unwrap()
            .unwrap();

        assert!(updated.is_valid);
        assert!(updated.invalids.is_empty());
        assert_eq!(updated.url(), Some("https://api.example.com"));
    }

    #[tokio::test]
    async fn test_find_all_by_ids_empty_input() {
        let (operations, converter, policy_utils) = collaborators();
        let repo = create_datasource_repository(operations, converter, policy_utils);

        let found = repo
            .find_all_by_ids(&[], None, &User::new("ana@example.com"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
