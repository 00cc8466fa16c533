use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod breaker;
pub mod memory;
pub mod records;
pub mod sqlite;

pub use breaker::{BreakerState, BreakerTransition, FallbackBreaker};
pub use memory::MemoryDocumentStore;
pub use records::{FailurePolicy, RecordStore, StorageStatus, StoreOptions};
pub use sqlite::{SqliteDocumentStore, LEADFLOW_SCHEMA_VERSION};

/// The failure classes that mean the backing store itself cannot serve requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnavailableKind {
    PermissionDenied,
    Unimplemented,
    NotFound,
    FailedPrecondition,
}

impl UnavailableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unimplemented => "unimplemented",
            Self::NotFound => "not-found",
            Self::FailedPrecondition => "failed-precondition",
        }
    }
}

impl fmt::Display for UnavailableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable ({kind}): {message}")]
    Unavailable {
        kind: UnavailableKind,
        message: String,
    },
    #[error("{collection} document not found: {id}")]
    NotFound { collection: Collection, id: String },
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

impl StorageError {
    pub fn unavailable(kind: UnavailableKind, message: impl Into<String>) -> Self {
        Self::Unavailable {
            kind,
            message: message.into(),
        }
    }

    /// True for the failure classes that may be answered from the in-memory fallback.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::UnsupportedSchemaVersion { .. }
        )
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match sqlite::classify(&err) {
            Some(kind) => Self::unavailable(kind, err.to_string()),
            None => Self::Sqlite(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Leads,
    Rates,
    Phonebook,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Rates => "rates",
            Self::Phonebook => "phonebook",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// A stored JSON object. The id lives beside the body, never inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Map<String, Value>,
}

impl Document {
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, StorageError> {
        let mut body = self.body;
        body.insert("id".to_string(), Value::String(self.id));
        serde_json::from_value(Value::Object(body))
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }
}

/// Serializes a record into a document body, dropping its `id`.
pub fn encode<T: Serialize>(value: &T) -> Result<Map<String, Value>, StorageError> {
    match serde_json::to_value(value).map_err(|err| StorageError::Serialization(err.to_string()))? {
        Value::Object(mut body) => {
            body.remove("id");
            Ok(body)
        }
        other => Err(StorageError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

pub fn decode_all<T: serde::de::DeserializeOwned>(
    documents: Vec<Document>,
) -> Result<Vec<T>, StorageError> {
    documents.into_iter().map(Document::decode).collect()
}

/// Top-level field conditions. Every predicate in a query must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    /// Membership test. An empty set matches nothing.
    In { field: String, values: Vec<Value> },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::In { field, .. } => field,
        }
    }

    pub fn matches(&self, body: &Map<String, Value>) -> bool {
        match self {
            Self::Eq { field, value } => body.get(field).unwrap_or(&Value::Null) == value,
            Self::In { field, values } => match body.get(field) {
                None | Some(Value::Null) => false,
                Some(actual) => values.contains(actual),
            },
        }
    }
}

/// A flat document store keyed by collection.
pub trait DocumentStore: Send {
    fn backend(&self) -> BackendKind;

    fn insert(
        &mut self,
        collection: Collection,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError>;

    /// Inserts unless a document with the same `key_field` value already exists.
    /// The check and the insert are one atomic step.
    fn insert_if_absent(
        &mut self,
        collection: Collection,
        key_field: &str,
        body: Map<String, Value>,
    ) -> Result<Option<Document>, StorageError>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError>;

    fn replace(
        &mut self,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError>;

    /// Returns whether a document was removed.
    fn delete(&mut self, collection: Collection, id: &str) -> Result<bool, StorageError>;

    /// Matching documents in insertion order.
    fn find(
        &self,
        collection: Collection,
        predicates: &[Predicate],
    ) -> Result<Vec<Document>, StorageError>;

    fn count(&self, collection: Collection, predicates: &[Predicate])
        -> Result<u64, StorageError>;

    /// Advances a named counter to `max(current, floor) + 1` and returns it.
    fn next_sequence(&mut self, name: &str, floor: u64) -> Result<u64, StorageError>;
}

pub(crate) fn key_value<'a>(
    body: &'a Map<String, Value>,
    key_field: &str,
) -> Result<&'a Value, StorageError> {
    match body.get(key_field) {
        None | Some(Value::Null) => Err(StorageError::InvalidQuery(format!(
            "document has no value for key field {key_field}"
        ))),
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn predicates_match_top_level_fields() {
        let doc = body(json!({"status": "Dead", "frequency": "WEEKLY"}));
        assert!(Predicate::eq("status", "Dead").matches(&doc));
        assert!(!Predicate::eq("status", "New").matches(&doc));
        assert!(Predicate::eq("note", Value::Null).matches(&doc));
        assert!(Predicate::any_of("frequency", ["WEEKLY", "MONTHLY"]).matches(&doc));
        assert!(!Predicate::any_of("frequency", Vec::<&str>::new()).matches(&doc));
        assert!(!Predicate::any_of("note", ["x"]).matches(&doc));
    }

    #[test]
    fn encode_strips_id_and_decode_restores_it() {
        let entry = leadflow_core::PhonebookEntry {
            id: "p-1".to_string(),
            ..leadflow_core::PhonebookEntry::for_contact("Asha", "555")
        };
        let encoded = encode(&entry).expect("encode");
        assert!(encoded.get("id").is_none());

        let decoded: leadflow_core::PhonebookEntry = Document {
            id: "p-2".to_string(),
            body: encoded,
        }
        .decode()
        .expect("decode");
        assert_eq!(decoded.id, "p-2");
        assert_eq!(decoded.name, "Asha");
    }

    #[test]
    fn unavailable_errors_are_distinguished() {
        assert!(StorageError::unavailable(UnavailableKind::PermissionDenied, "nope").is_unavailable());
        assert!(!StorageError::InvalidQuery("bad".to_string()).is_unavailable());
        assert!(!StorageError::NotFound {
            collection: Collection::Leads,
            id: "x".to_string()
        }
        .is_unavailable());
        assert_eq!("In-Memory".parse(), Ok(BackendKind::Memory));
    }
}
