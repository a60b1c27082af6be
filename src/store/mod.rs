//! Document store abstraction consumed by the progression engine.
//!
//! The engine never talks to a concrete database. It is handed something that
//! implements [`DocumentStore`]: per-document create/get/update/delete plus a
//! single-field filtered query over one collection. Two backends ship here:
//!
//! - [`SledDocumentStore`] persists JSON documents in one sled tree per collection.
//! - [`MemoryDocumentStore`] keeps everything in process; tests and `--ephemeral` runs use it.
//!
//! No operation is transactional. Callers that need read-modify-write safety
//! serialize themselves (see `progression::locks`).

use std::cmp::Ordering;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::SideQuestError;

mod memory;
mod sled_store;

pub use memory::MemoryDocumentStore;
pub use sled_store::{SledDocumentStore, SledDocumentStoreBuilder};

/// A stored document: a flat JSON object. The `id` field mirrors the key.
pub type Document = Map<String, Value>;

/// Field that always carries the document id.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Quests,
    Sidequests,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Quests => "quests",
            Collection::Sidequests => "sidequests",
        }
    }

    /// Singular entity name used in `NotFound` errors.
    pub fn entity(&self) -> &'static str {
        match self {
            Collection::Users => "user",
            Collection::Quests => "quest",
            Collection::Sidequests => "sidequest",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// `field <op> value` over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Documents lacking the field never match.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::NotEq => !values_equal(actual, &self.value),
            FilterOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // 3 and 3.0 are the same number
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Hosted-document-database style CRUD over named collections.
pub trait DocumentStore: Send + Sync {
    /// Write `data` under `id` (a fresh v4 UUID when `None`), replacing any
    /// existing document, and return the id used.
    fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, SideQuestError>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, SideQuestError>;

    /// Shallow-merge `patch` into an existing document.
    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<(), SideQuestError>;

    /// Remove a document. Deleting a missing id is not an error.
    fn delete(&self, collection: Collection, id: &str) -> Result<(), SideQuestError>;

    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, SideQuestError>;
}

/// Resolve the id for a create call and stamp it into the document body.
pub(crate) fn prepare_create(id: Option<&str>, mut data: Document) -> (String, Document) {
    let id = match id {
        Some(id) => id.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    data.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    (id, data)
}

/// Apply a shallow patch. The id field is never rewritten.
pub(crate) fn merge_patch(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        target.insert(key, value);
    }
}

/// Encode a record as a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, SideQuestError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SideQuestError::Internal(format!(
            "expected a JSON object document, got {}",
            other
        ))),
    }
}

/// Decode a document back into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, SideQuestError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Build a patch from `(field, value)` pairs.
pub fn patch<I, K>(fields: I) -> Document
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
