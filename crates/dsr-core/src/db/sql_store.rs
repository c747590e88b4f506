//! SQL-backed document store.
//!
//! Documents are kept as JSON text in a single `documents` table keyed by
//! `(collection, id)`. Criteria are evaluated in process after the collection
//! is loaded, so matching behaves exactly like [`InMemoryDocumentStore`].
//!
//! [`InMemoryDocumentStore`]: super::InMemoryDocumentStore

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::operations::{check_update, document_id};
use super::retry::{with_retry, RetryConfig};
use super::{Criteria, DbError, DbPool, Document, DocumentOperations, Query, Update};

/// Document store over a SQLite or PostgreSQL pool.
#[derive(Clone)]
pub struct SqlDocumentStore {
    pool: DbPool,
    retry: RetryConfig,
}

impl SqlDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn load(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        with_retry(&self.retry, "load_documents", || self.load_once(collection)).await
    }

    async fn load_once(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        let bodies: Vec<String> = match &self.pool {
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? ORDER BY id")
                    .bind(collection)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Postgres(pool) => {
                sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 ORDER BY id")
                    .bind(collection)
                    .fetch_all(pool)
                    .await?
            }
        };

        bodies.iter().map(|b| parse_body(b)).collect()
    }

    async fn write(&self, collection: &str, doc: &Document, upsert: bool) -> Result<(), DbError> {
        let id = document_id(doc)?;
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().to_rfc3339();

        match &self.pool {
            DbPool::Sqlite(pool) => {
                let sql = if upsert {
                    "INSERT INTO documents (collection, id, body, updated_at) VALUES (?, ?, ?, ?) \
                     ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"
                } else {
                    "INSERT INTO documents (collection, id, body, updated_at) VALUES (?, ?, ?, ?)"
                };
                sqlx::query(sql)
                    .bind(collection)
                    .bind(id)
                    .bind(&body)
                    .bind(&now)
                    .execute(pool)
                    .await?;
            }
            DbPool::Postgres(pool) => {
                let sql = if upsert {
                    "INSERT INTO documents (collection, id, body, updated_at) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"
                } else {
                    "INSERT INTO documents (collection, id, body, updated_at) VALUES ($1, $2, $3, $4)"
                };
                sqlx::query(sql)
                    .bind(collection)
                    .bind(id)
                    .bind(&body)
                    .bind(&now)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Read-modify-write inside one transaction, retried on lock contention.
    async fn update_matching(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
        first_only: bool,
    ) -> Result<u64, DbError> {
        check_update(update)?;
        let modified = with_retry(&self.retry, "update_documents", || {
            self.update_matching_once(collection, criteria, update, first_only)
        })
        .await?;

        debug!(collection, modified, "Updated documents");
        Ok(modified)
    }

    async fn update_matching_once(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
        first_only: bool,
    ) -> Result<u64, DbError> {
        let now = Utc::now().to_rfc3339();

        match &self.pool {
            DbPool::Sqlite(pool) => {
                // IMMEDIATE takes the write lock up front so contention waits
                // on the busy timeout instead of failing the lock upgrade.
                let mut conn = pool.acquire().await?;
                sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

                let result =
                    update_sqlite_documents(&mut *conn, collection, criteria, update, first_only, &now)
                        .await;
                let finish = match result {
                    Ok(_) => sqlx::query("COMMIT").execute(&mut *conn).await,
                    Err(_) => sqlx::query("ROLLBACK").execute(&mut *conn).await,
                };

                match (result, finish) {
                    (Ok(modified), Ok(_)) => Ok(modified),
                    (Ok(_), Err(e)) => {
                        if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                            warn!(error = %rollback, "Rollback after failed commit failed");
                        }
                        Err(DbError::Transaction(e.to_string()))
                    }
                    (Err(e), Ok(_)) => Err(e),
                    (Err(e), Err(rollback)) => {
                        warn!(error = %rollback, "Rollback failed");
                        Err(e)
                    }
                }
            }
            DbPool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let bodies: Vec<String> = sqlx::query_scalar(
                    "SELECT body FROM documents WHERE collection = $1 ORDER BY id FOR UPDATE",
                )
                .bind(collection)
                .fetch_all(&mut *tx)
                .await?;

                let mut modified = 0;
                for body in bodies {
                    let mut doc = parse_body(&body)?;
                    if !criteria.matches(&doc) {
                        continue;
                    }
                    update.apply(&mut doc);
                    sqlx::query(
                        "UPDATE documents SET body = $1, updated_at = $2 WHERE collection = $3 AND id = $4",
                    )
                    .bind(serde_json::to_string(&doc)?)
                    .bind(&now)
                    .bind(collection)
                    .bind(document_id(&doc)?)
                    .execute(&mut *tx)
                    .await?;
                    modified += 1;
                    if first_only {
                        break;
                    }
                }

                tx.commit()
                    .await
                    .map_err(|e| DbError::Transaction(e.to_string()))?;
                Ok(modified)
            }
        }
    }

    async fn collection_names_once(&self) -> Result<Vec<String>, DbError> {
        let names: Vec<String> = match &self.pool {
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar("SELECT DISTINCT collection FROM documents ORDER BY collection")
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Postgres(pool) => {
                sqlx::query_scalar("SELECT DISTINCT collection FROM documents ORDER BY collection")
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(names)
    }
}

/// Applies `update` to matching documents on a connection inside an open
/// SQLite transaction.
async fn update_sqlite_documents(
    conn: &mut sqlx::SqliteConnection,
    collection: &str,
    criteria: &Criteria,
    update: &Update,
    first_only: bool,
    now: &str,
) -> Result<u64, DbError> {
    let bodies: Vec<String> =
        sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&mut *conn)
            .await?;

    let mut modified = 0;
    for body in bodies {
        let mut doc = parse_body(&body)?;
        if !criteria.matches(&doc) {
            continue;
        }
        update.apply(&mut doc);
        sqlx::query("UPDATE documents SET body = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&doc)?)
            .bind(now)
            .bind(collection)
            .bind(document_id(&doc)?)
            .execute(&mut *conn)
            .await?;
        modified += 1;
        if first_only {
            break;
        }
    }
    Ok(modified)
}

fn parse_body(body: &str) -> Result<Document, DbError> {
    match serde_json::from_str(body)? {
        serde_json::Value::Object(doc) => Ok(doc),
        _ => Err(DbError::Serialization(
            "Stored document body is not a JSON object".to_string(),
        )),
    }
}

#[async_trait]
impl DocumentOperations for SqlDocumentStore {
    #[instrument(skip(self, doc))]
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, DbError> {
        with_retry(&self.retry, "insert_document", || self.write(collection, &doc, false)).await?;
        Ok(doc)
    }

    #[instrument(skip(self, doc))]
    async fn save(&self, collection: &str, doc: Document) -> Result<Document, DbError> {
        with_retry(&self.retry, "save_document", || self.write(collection, &doc, true)).await?;
        Ok(doc)
    }

    async fn find_one(
        &self,
        collection: &str,
        criteria: &Criteria,
    ) -> Result<Option<Document>, DbError> {
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .find(|d| criteria.matches(d)))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DbError> {
        Ok(query.apply(self.load(collection).await?))
    }

    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64, DbError> {
        Ok(self
            .load(collection)
            .await?
            .iter()
            .filter(|d| criteria.matches(d))
            .count() as u64)
    }

    async fn update_first(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError> {
        self.update_matching(collection, criteria, update, true).await
    }

    async fn update_many(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError> {
        self.update_matching(collection, criteria, update, false).await
    }

    async fn collection_names(&self) -> Result<Vec<String>, DbError> {
        with_retry(&self.retry, "collection_names", || self.collection_names_once()).await
    }
}
