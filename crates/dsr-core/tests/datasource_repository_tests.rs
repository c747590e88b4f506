//! Repository scenarios for datasources over the in-memory document store.

use std::sync::Arc;

use dsr_core::db::{
    create_datasource_repository, DatasourceRepository, DatasourceUpdate, DocumentConverter,
    InMemoryDocumentStore, Pagination,
};
use dsr_core::{
    AclPermission, Datasource, DatasourceConfiguration, Entity, Policy, PolicyUtils, User,
};

struct Fixture {
    repo: Arc<dyn DatasourceRepository>,
    store: InMemoryDocumentStore,
    policy_utils: Arc<PolicyUtils>,
}

fn fixture() -> Fixture {
    let store = InMemoryDocumentStore::new();
    let policy_utils = Arc::new(PolicyUtils::new());
    let repo = create_datasource_repository(
        Arc::new(store.clone()),
        Arc::new(DocumentConverter::new()),
        Arc::clone(&policy_utils),
    );
    Fixture {
        repo,
        store,
        policy_utils,
    }
}

fn ana() -> User {
    User::new("ana@example.com").with_group("eng")
}

fn bob() -> User {
    User::new("bob@example.com")
}

impl Fixture {
    async fn create(&self, name: &str, org: &str, owner: &User) -> Datasource {
        let mut ds = Datasource::new(name, "restapi-plugin", org).with_configuration(
            DatasourceConfiguration {
                url: Some(format!("https://{}.example.com", name.to_lowercase())),
                ..Default::default()
            },
        );
        ds.base.policies = self
            .policy_utils
            .generate_policies(&[AclPermission::ManageDatasources], owner);
        ds.refresh_validity();
        self.repo.save(&ds).await.unwrap()
    }
}

#[tokio::test]
async fn test_find_all_by_organization_sorted_and_scoped() {
    let f = fixture();
    f.create("Zeta", "org-1", &ana()).await;
    f.create("Alpha", "org-1", &ana()).await;
    f.create("Other", "org-2", &ana()).await;

    let found = f
        .repo
        .find_all_by_organization_id("org-1", Some(AclPermission::ReadDatasources), &ana())
        .await
        .unwrap();

    let names: Vec<_> = found.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Zeta"]);
    assert!(found
        .iter()
        .all(|d| d.base.user_permissions.contains("read:datasources")));
}

#[tokio::test]
async fn test_other_users_see_nothing_without_grant() {
    let f = fixture();
    let created = f.create("Users", "org-1", &ana()).await;
    let id = created.id().unwrap();

    assert!(f
        .repo
        .find_all_by_organization_id("org-1", Some(AclPermission::ReadDatasources), &bob())
        .await
        .unwrap()
        .is_empty());
    assert!(f
        .repo
        .find_by_id(id, Some(AclPermission::ReadDatasources), &bob())
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        f.repo
            .count_by_organization_id("org-1", Some(AclPermission::ReadDatasources), &bob())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_group_grant_gives_access() {
    let f = fixture();
    let mut ds = Datasource::new("Shared", "restapi-plugin", "org-1");
    ds.base
        .policies
        .insert(Policy::new(AclPermission::ReadDatasources).with_group("eng"));
    let saved = f.repo.save(&ds).await.unwrap();

    let found = f
        .repo
        .find_by_id(saved.id().unwrap(), Some(AclPermission::ReadDatasources), &ana())
        .await
        .unwrap()
        .expect("group member should see the datasource");
    assert_eq!(
        found.base.user_permissions.iter().collect::<Vec<_>>(),
        vec!["read:datasources"]
    );

    assert!(f
        .repo
        .find_by_id(saved.id().unwrap(), Some(AclPermission::ManageDatasources), &ana())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_find_by_name_and_organization() {
    let f = fixture();
    f.create("Users", "org-1", &ana()).await;
    f.create("Users", "org-2", &ana()).await;

    let found = f
        .repo
        .find_by_name_and_organization_id("Users", "org-2", None, &ana())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.organization_id.as_deref(), Some("org-2"));

    assert!(f
        .repo
        .find_by_name_and_organization_id("Orders", "org-1", None, &ana())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_find_all_by_ids() {
    let f = fixture();
    let a = f.create("A", "org-1", &ana()).await;
    let b = f.create("B", "org-1", &bob()).await;
    f.create("C", "org-1", &ana()).await;

    let ids = vec![a.id().unwrap().to_string(), b.id().unwrap().to_string()];
    let unrestricted = f.repo.find_all_by_ids(&ids, None, &ana()).await.unwrap();
    assert_eq!(unrestricted.len(), 2);

    let permitted = f
        .repo
        .find_all_by_ids(&ids, Some(AclPermission::ReadDatasources), &ana())
        .await
        .unwrap();
    assert_eq!(permitted.len(), 1);
    assert_eq!(permitted[0].name, "A");
}

#[tokio::test]
async fn test_archived_datasources_are_invisible() {
    let f = fixture();
    let created = f.create("Users", "org-1", &ana()).await;
    let id = created.id().unwrap();

    assert!(f
        .repo
        .archive_by_id(id, Some(AclPermission::ManageDatasources), &ana())
        .await
        .unwrap());

    assert!(f.repo.find_by_id(id, None, &ana()).await.unwrap().is_none());
    assert!(f
        .repo
        .find_by_name_and_organization_id("Users", "org-1", None, &ana())
        .await
        .unwrap()
        .is_none());
    assert!(f
        .repo
        .find_all_by_ids(&[id.to_string()], None, &ana())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        f.repo.count_by_organization_id("org-1", None, &ana()).await.unwrap(),
        0
    );

    let update = DatasourceUpdate {
        name: Some("Revived".to_string()),
        ..Default::default()
    };
    assert!(f
        .repo
        .update_by_id(id, &update, None, &ana())
        .await
        .unwrap()
        .is_none());

    let stored = f.store.snapshot("datasource").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["deleted"], true);
    assert!(stored[0]["deletedAt"].is_string());
}

#[tokio::test]
async fn test_update_requires_permission() {
    let f = fixture();
    let created = f.create("Users", "org-1", &ana()).await;
    let id = created.id().unwrap();
    let update = DatasourceUpdate {
        name: Some("Renamed".to_string()),
        ..Default::default()
    };

    assert!(f
        .repo
        .update_by_id(id, &update, Some(AclPermission::ManageDatasources), &bob())
        .await
        .unwrap()
        .is_none());

    let updated = f
        .repo
        .update_by_id(id, &update, Some(AclPermission::ManageDatasources), &ana())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.base.policies, created.base.policies);
}

#[tokio::test]
async fn test_page_by_organization() {
    let f = fixture();
    for name in ["a", "b", "c", "d", "e"] {
        f.create(name, "org-1", &ana()).await;
    }

    let page = f
        .repo
        .find_page_by_organization_id(
            "org-1",
            Some(AclPermission::ReadDatasources),
            &ana(),
            &Pagination::new(3, 2),
        )
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.len(), 1);
    assert_eq!(page.items[0].name, "e");
    assert!(!page.has_next_page());
    assert!(page.has_previous_page());
}

#[tokio::test]
async fn test_saved_datasource_keeps_validity() {
    let f = fixture();
    let created = f.create("Users", "org-1", &ana()).await;
    assert!(created.is_valid);

    let mut broken = Datasource::new("", "restapi-plugin", "org-1");
    broken.refresh_validity();
    let saved = f.repo.save(&broken).await.unwrap();
    assert!(!saved.is_valid);
    assert!(saved.invalids.contains("Missing name for datasource"));
}
