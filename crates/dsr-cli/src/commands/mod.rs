//! CLI command implementations.

mod datasource;

pub use datasource::{run_datasource_command, CommandContext, DatasourceCommands};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use dsr_core::db::{
    create_datasource_repository, DatasourceRepository, DocumentConverter, DocumentOperations,
    InMemoryDocumentStore,
};
use dsr_core::PolicyUtils;

use crate::config::DatabaseConfig;

/// Database URL selecting the process-local in-memory store.
pub const MEMORY_DATABASE: &str = "memory";

/// The repository and the policy helper it was built with.
pub struct Registry {
    pub repository: Arc<dyn DatasourceRepository>,
    pub policy_utils: Arc<PolicyUtils>,
}

/// Opens the configured document store and builds the datasource repository.
pub async fn open_registry(config: &DatabaseConfig) -> Result<Registry> {
    let operations = open_operations(config).await?;
    let policy_utils = Arc::new(PolicyUtils::new());
    let repository = create_datasource_repository(
        operations,
        Arc::new(DocumentConverter::new()),
        Arc::clone(&policy_utils),
    );

    Ok(Registry {
        repository,
        policy_utils,
    })
}

async fn open_operations(config: &DatabaseConfig) -> Result<Arc<dyn DocumentOperations>> {
    if config.url == MEMORY_DATABASE {
        info!("Using in-memory document store");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    }
    open_sql_operations(config).await
}

#[cfg(feature = "database")]
async fn open_sql_operations(config: &DatabaseConfig) -> Result<Arc<dyn DocumentOperations>> {
    use anyhow::Context;
    use dsr_core::db::{
        create_document_operations, create_pool_with_options, run_migrations, PoolOptions,
    };

    let mut options = PoolOptions::default();
    if let Some(max_connections) = config.max_connections {
        options.max_connections = max_connections;
        options.min_connections = options.min_connections.min(max_connections);
    }

    let pool = create_pool_with_options(&config.url, options)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    if !pool.is_healthy().await {
        anyhow::bail!("Database is not responding after migrations");
    }
    info!(backend = pool.db_type(), "Database ready");

    Ok(create_document_operations(&pool))
}

#[cfg(not(feature = "database"))]
async fn open_sql_operations(config: &DatabaseConfig) -> Result<Arc<dyn DocumentOperations>> {
    anyhow::bail!(
        "Database '{}' requires the `database` feature; use --database {} instead",
        config.url,
        MEMORY_DATABASE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsr_core::{Datasource, Entity, User};

    #[tokio::test]
    async fn test_open_memory_registry() {
        let config = DatabaseConfig {
            url: MEMORY_DATABASE.to_string(),
            max_connections: None,
        };
        let registry = open_registry(&config).await.unwrap();

        let saved = registry
            .repository
            .save(&Datasource::new("Users", "restapi-plugin", "org-1"))
            .await
            .unwrap();
        let found = registry
            .repository
            .find_by_id(saved.id().unwrap(), None, &User::new("ana"))
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
