//! Database connection pool management.

use super::DbError;
use std::time::Duration;

#[cfg(feature = "database")]
use sqlx::{Pool, Postgres, Sqlite};

/// Connection pool for SQLite (development, tests) or PostgreSQL (production).
#[cfg(feature = "database")]
#[derive(Clone)]
pub enum DbPool {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
}

#[cfg(not(feature = "database"))]
pub struct DbPool;

/// Options for creating a database connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    /// Reads `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS` and
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS`, falling back to 10, 1 and 30.
    fn default() -> Self {
        fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }

        Self {
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 30)),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Returns the backend named by a database URL scheme.
pub fn backend_for_url(database_url: &str) -> Result<&'static str, DbError> {
    if database_url.starts_with("sqlite:") {
        Ok("sqlite")
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(DbError::Configuration(format!(
            "Unsupported database URL scheme. Expected sqlite: or postgres://, got: {}",
            database_url.split(':').next().unwrap_or("unknown")
        )))
    }
}

/// Creates a pool from a database URL with options from the environment.
pub async fn create_pool(database_url: &str) -> Result<DbPool, DbError> {
    create_pool_with_options(database_url, PoolOptions::default()).await
}

/// Creates a pool with explicit options.
#[cfg(feature = "database")]
pub async fn create_pool_with_options(
    database_url: &str,
    options: PoolOptions,
) -> Result<DbPool, DbError> {
    use tracing::info;

    match backend_for_url(database_url)? {
        "sqlite" => {
            info!(max_connections = options.max_connections, "Creating SQLite connection pool");
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(options.max_connections)
                .min_connections(options.min_connections)
                .acquire_timeout(options.acquire_timeout)
                .idle_timeout(options.idle_timeout)
                .connect(database_url)
                .await?;
            Ok(DbPool::Sqlite(pool))
        }
        _ => {
            info!(max_connections = options.max_connections, "Creating PostgreSQL connection pool");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(options.max_connections)
                .min_connections(options.min_connections)
                .acquire_timeout(options.acquire_timeout)
                .idle_timeout(options.idle_timeout)
                .connect(database_url)
                .await?;
            Ok(DbPool::Postgres(pool))
        }
    }
}

#[cfg(not(feature = "database"))]
pub async fn create_pool_with_options(
    _database_url: &str,
    _options: PoolOptions,
) -> Result<DbPool, DbError> {
    Err(DbError::Configuration(
        "Database support not enabled. Compile with --features database".to_string(),
    ))
}

#[cfg(feature = "database")]
impl DbPool {
    pub fn db_type(&self) -> &'static str {
        match self {
            DbPool::Sqlite(_) => "sqlite",
            DbPool::Postgres(_) => "postgres",
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self {
            DbPool::Sqlite(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            DbPool::Postgres(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
        }
    }
}
