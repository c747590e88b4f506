//! The document store abstraction repositories are built on.

use async_trait::async_trait;
use serde_json::Value;

use super::{Criteria, DbError, Document, Query, Update};
use crate::domain::fields;

/// Non-blocking access to collections of JSON documents.
///
/// Every document carries a string `id` that is unique within its collection.
/// Implementations must be thread-safe; repositories share one instance
/// through an `Arc`.
#[async_trait]
pub trait DocumentOperations: Send + Sync {
    /// Inserts a new document. Fails with `DbError::Constraint` if the id is
    /// already taken.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, DbError>;

    /// Inserts the document or replaces the one with the same id.
    async fn save(&self, collection: &str, doc: Document) -> Result<Document, DbError>;

    /// Returns the first document matching the criteria.
    async fn find_one(
        &self,
        collection: &str,
        criteria: &Criteria,
    ) -> Result<Option<Document>, DbError>;

    /// Returns the documents matching the query, sorted and paged.
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DbError>;

    /// Counts the documents matching the criteria.
    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64, DbError>;

    /// Applies the update to the first matching document. Returns the number of
    /// documents modified (0 or 1).
    async fn update_first(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError>;

    /// Applies the update to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Update,
    ) -> Result<u64, DbError>;

    /// Lists collections that hold at least one document.
    async fn collection_names(&self) -> Result<Vec<String>, DbError>;
}

/// Extracts the id of a document.
pub fn document_id(doc: &Document) -> Result<&str, DbError> {
    match doc.get(fields::ID) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        _ => Err(DbError::Constraint("Document is missing a string id".to_string())),
    }
}

/// Top-level field written by a dotted update path.
pub fn root_field(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Rejects updates that would rewrite a document's identity.
pub fn check_update(update: &Update) -> Result<(), DbError> {
    let touches_id = |path: &str| root_field(path) == fields::ID;
    if update.set.keys().any(|k| touches_id(k)) || update.unset.iter().any(|f| touches_id(f)) {
        return Err(DbError::Constraint("The id of a document cannot be updated".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let doc = json!({"id": "abc"}).as_object().cloned().unwrap();
        assert_eq!(document_id(&doc).unwrap(), "abc");

        let doc = json!({"id": 7}).as_object().cloned().unwrap();
        assert!(matches!(document_id(&doc), Err(DbError::Constraint(_))));

        assert!(document_id(&Document::new()).is_err());
    }

    #[test]
    fn test_check_update_rejects_id() {
        assert!(check_update(&Update::new().set("name", "x")).is_ok());
        assert!(check_update(&Update::new().set("id", "y")).is_err());
        assert!(check_update(&Update::new().unset("id")).is_err());
    }

    #[test]
    fn test_check_update_rejects_nested_id_paths() {
        assert!(check_update(&Update::new().set("id.value", "y")).is_err());
        assert!(check_update(&Update::new().unset("id.0")).is_err());
        assert!(check_update(&Update::new().set("identity.name", "x")).is_ok());
    }

    #[test]
    fn test_root_field() {
        assert_eq!(root_field("policies.0.users"), "policies");
        assert_eq!(root_field("name"), "name");
    }
}
