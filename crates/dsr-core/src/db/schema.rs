//! Database schema.

use super::{DbError, DbPool};

/// Creates the documents table if it does not exist.
#[cfg(feature = "database")]
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    use tracing::info;

    match pool {
        DbPool::Sqlite(pool) => {
            info!("Running SQLite migrations");
            sqlx::query(sql::CREATE_DOCUMENTS_TABLE)
                .execute(pool)
                .await
                .map_err(|e| DbError::Migration(e.to_string()))?;
        }
        DbPool::Postgres(pool) => {
            info!("Running PostgreSQL migrations");
            sqlx::query(sql::CREATE_DOCUMENTS_TABLE)
                .execute(pool)
                .await
                .map_err(|e| DbError::Migration(e.to_string()))?;
        }
    }

    info!("Migrations completed successfully");
    Ok(())
}

#[cfg(not(feature = "database"))]
pub async fn run_migrations(_pool: &DbPool) -> Result<(), DbError> {
    Err(DbError::Configuration(
        "Database support not enabled".to_string(),
    ))
}

/// SQL statements shared by both backends.
pub mod sql {
    /// One row per document; `body` holds the camelCase JSON.
    pub const CREATE_DOCUMENTS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
    "#;
}
