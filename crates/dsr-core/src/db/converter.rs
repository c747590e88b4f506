//! Conversion between entities and stored documents.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::{DbError, Document};
use crate::domain::fields;

/// Maps entities to documents and back.
///
/// Transient fields are removed before a document is written, so values such
/// as per-caller permissions are never persisted.
#[derive(Debug, Clone)]
pub struct DocumentConverter {
    transient_fields: BTreeSet<String>,
    omit_nulls: bool,
}

impl Default for DocumentConverter {
    fn default() -> Self {
        Self {
            transient_fields: BTreeSet::from([fields::USER_PERMISSIONS.to_string()]),
            omit_nulls: false,
        }
    }
}

impl DocumentConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an additional top-level field as transient.
    pub fn with_transient_field(mut self, field: impl Into<String>) -> Self {
        self.transient_fields.insert(field.into());
        self
    }

    /// Drops top-level null values from written documents.
    pub fn omit_nulls(mut self, omit: bool) -> Self {
        self.omit_nulls = omit;
        self
    }

    pub fn is_transient(&self, field: &str) -> bool {
        self.transient_fields.contains(field)
    }

    /// Converts an entity into a document ready to be stored.
    pub fn write<T: Serialize>(&self, entity: &T) -> Result<Document, DbError> {
        let mut doc = match serde_json::to_value(entity)? {
            Value::Object(map) => map,
            other => {
                return Err(DbError::Serialization(format!(
                    "Expected an object, got {}",
                    type_name(&other)
                )))
            }
        };

        doc.retain(|k, v| !self.transient_fields.contains(k) && !(self.omit_nulls && v.is_null()));
        Ok(doc)
    }

    /// Converts a stored document into an entity.
    pub fn read<T: DeserializeOwned>(&self, doc: Document) -> Result<T, DbError> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
