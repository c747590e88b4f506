//! Composable document queries.
//!
//! Criteria are evaluated in process against JSON documents, so every store
//! implementation shares the same matching semantics:
//!
//! - Field paths are dotted (`datasourceConfiguration.url`); arrays met on the
//!   way are traversed element by element.
//! - `Eq`/`In` on an array field match when any element matches.
//! - `Eq(path, null)` matches both an explicit null and a missing field.
//! - `Exists(path, true)` matches explicit nulls.

use serde_json::Value;
use std::cmp::Ordering;

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, Value>;

/// A filter over documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Exists(String, bool),
    /// Some element of the array at the path matches the inner criteria.
    ElemMatch(String, Box<Criteria>),
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Not(Box<Criteria>),
}

impl Criteria {
    /// Matches every document.
    pub fn all() -> Self {
        Criteria::And(Vec::new())
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Criteria::Eq(path.into(), value.into())
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Criteria::Ne(path.into(), value.into())
    }

    pub fn is_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Criteria::In(path.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Criteria::Exists(path.into(), exists)
    }

    pub fn elem_match(path: impl Into<String>, criteria: Criteria) -> Self {
        Criteria::ElemMatch(path.into(), Box::new(criteria))
    }

    pub fn and(criteria: Vec<Criteria>) -> Self {
        Criteria::And(criteria)
    }

    pub fn or(criteria: Vec<Criteria>) -> Self {
        Criteria::Or(criteria)
    }

    pub fn negate(criteria: Criteria) -> Self {
        Criteria::Not(Box::new(criteria))
    }

    /// Evaluates the criteria against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Criteria::Eq(path, expected) => {
                let values = resolve(doc, path);
                if values.is_empty() {
                    return expected.is_null();
                }
                values.iter().any(|v| value_matches(v, expected))
            }
            Criteria::Ne(path, expected) => !Criteria::Eq(path.clone(), expected.clone()).matches(doc),
            Criteria::In(path, candidates) => {
                let values = resolve(doc, path);
                if values.is_empty() {
                    return candidates.iter().any(Value::is_null);
                }
                values
                    .iter()
                    .any(|v| candidates.iter().any(|c| value_matches(v, c)))
            }
            Criteria::Exists(path, should_exist) => !resolve(doc, path).is_empty() == *should_exist,
            Criteria::ElemMatch(path, inner) => resolve(doc, path).iter().any(|v| match v {
                Value::Array(items) => items.iter().any(|item| match item {
                    Value::Object(obj) => inner.matches(obj),
                    _ => false,
                }),
                _ => false,
            }),
            Criteria::And(all) => all.iter().all(|c| c.matches(doc)),
            Criteria::Or(any) => any.iter().any(|c| c.matches(doc)),
            Criteria::Not(inner) => !inner.matches(doc),
        }
    }
}

/// Collects the values at a dotted path, descending through arrays.
fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let first = match segments.next().and_then(|s| doc.get(s)) {
        Some(v) => v,
        None => return Vec::new(),
    };

    let mut current = vec![first];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(obj) => next.extend(obj.get(segment)),
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(obj) = item {
                            next.extend(obj.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match actual {
        Value::Array(items) => items.iter().any(|i| i == expected),
        _ => false,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sort {
    orders: Vec<(String, Direction)>,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::default().then_asc(field)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::default().then_desc(field)
    }

    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.orders.push((field.into(), Direction::Asc));
        self
    }

    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.orders.push((field.into(), Direction::Desc));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Compares two documents. Type order: missing/null, bool, number, string,
    /// array, object.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, direction) in &self.orders {
            let left = resolve(a, field).into_iter().next();
            let right = resolve(b, field).into_iter().next();
            let ordering = compare_values(left, right);
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// A filter plus sort and paging options.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub criteria: Criteria,
    pub sort: Sort,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            sort: Sort::default(),
            skip: 0,
            limit: None,
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters, sorts and pages a set of documents.
    pub fn apply<I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.criteria.matches(d))
            .collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| self.sort.compare(a, b));
        }

        let iter = matched.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Field assignments and removals applied to matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Applies the update in place. Intermediate objects on a dotted `set`
    /// path are created when missing.
    pub fn apply(&self, doc: &mut Document) {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone());
        }
        for path in &self.unset {
            unset_path(doc, path);
        }
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !child.is_object() {
                *child = Value::Object(Document::new());
            }
            if let Value::Object(obj) = child {
                set_path(obj, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(obj)) = doc.get_mut(head) {
                unset_path(obj, rest);
            }
        }
    }
}
