//! Persistence layer for Datasource Registry.
//!
//! Entities are stored as JSON documents through the [`DocumentOperations`]
//! trait. An in-memory store is always available; the SQL store (SQLite or
//! PostgreSQL via SQLx) requires the `database` feature.

mod converter;
mod criteria;
mod error;
mod memory;
pub mod operations;
pub mod pagination;
mod pool;
pub mod retry;
mod schema;
#[cfg(feature = "database")]
mod sql_store;

pub mod base_repo;
pub mod datasource_repo;

pub use converter::DocumentConverter;
pub use criteria::{Criteria, Direction, Document, Query, Sort, Update};
pub use error::DbError;
pub use memory::InMemoryDocumentStore;
pub use operations::DocumentOperations;
pub use pagination::{PaginatedResult, Pagination};
pub use pool::{backend_for_url, create_pool, create_pool_with_options, DbPool, PoolOptions};
pub use retry::{is_transient_error, with_retry, RetryConfig};
pub use schema::run_migrations;
#[cfg(feature = "database")]
pub use sql_store::SqlDocumentStore;

// Re-export repository traits and types
pub use base_repo::BaseRepository;
pub use datasource_repo::{DatasourceRepository, DatasourceRepositoryImpl, DatasourceUpdate};

// Re-export factory functions
pub use datasource_repo::create_datasource_repository;

/// Creates document operations over a database pool.
#[cfg(feature = "database")]
pub fn create_document_operations(pool: &DbPool) -> std::sync::Arc<dyn DocumentOperations> {
    std::sync::Arc::new(SqlDocumentStore::new(pool.clone()))
}
