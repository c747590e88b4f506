//! In-memory document store.
//!
//! Used by unit tests and by the CLI when no database is configured. Data lives
//! only as long as the store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use super::operations::{check_update, document_id};
use super::{Criteria, DbError, Document, DocumentOperations, Query, Update};

type Collection = BTreeMap<String, Document>;

/// Document store backed by a `HashMap` of collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a snapshot of every document in a collection.
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentOperations for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, DbError> {
        let id = document_id(&doc)?.to_string();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(DbError::Constraint(format!(
                "Document with id '{}' already exists in {}",
                id, collection
            )));
        }

        trace!(collection, id = %id, "Inserting document");
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn save(&self, collection: &str, doc: Document) -> Result<Document, DbError> {
        let id = document_id(&doc)?.to_string();
        let mut collections = self.collections.write().await;

        trace!(collection, id = %id, "Saving document");
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc.clone());
        Ok(doc)
    }

    async fn find_one(
        &self,
        collection: &str,
        criteria: &Criteria,
    ) -> Result<Option<Document>, DbError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.values().find(|d| criteria.matches(d)).cloned()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DbError> {
        let collections = self.collections.read().await;
        let docs = match collections.get(collection) {
            Some(docs) => docs.values().cloned().collect::<Vec<_>>(),
            None => return Ok(Vec::new()),
        };
        Ok(query.apply(docs))
    }

    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64, DbError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().filter(|d| criteria.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn update_first(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError> {
        check_update(update)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        match docs.values_mut().find(|d| criteria.matches(d)) {
            Some(doc) => {
                update.apply(doc);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_many(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError> {
        check_update(update)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for doc in docs.values_mut().filter(|d| criteria.matches(d)) {
            update.apply(doc);
            modified += 1;
        }
        Ok(modified)
    }

    async fn collection_names(&self) -> Result<Vec<String>, DbError> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
