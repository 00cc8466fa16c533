use crate::{
    key_value, BackendKind, Collection, Document, DocumentStore, Predicate, StorageError,
    UnavailableKind,
};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use rusqlite::TransactionBehavior;
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

pub const LEADFLOW_SCHEMA_VERSION: i64 = 1;

/// Maps SQLite failures onto the classes that mean "this store cannot serve requests".
pub(crate) fn classify(err: &rusqlite::Error) -> Option<UnavailableKind> {
    let rusqlite::Error::SqliteFailure(failure, message) = err else {
        return None;
    };
    let message = message.as_deref().unwrap_or_default();
    match failure.code {
        ErrorCode::PermissionDenied
        | ErrorCode::ReadOnly
        | ErrorCode::AuthorizationForStatementDenied => Some(UnavailableKind::PermissionDenied),
        ErrorCode::CannotOpen => Some(UnavailableKind::NotFound),
        ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
            Some(UnavailableKind::FailedPrecondition)
        }
        ErrorCode::Unknown if message.starts_with("no such table") => {
            Some(UnavailableKind::FailedPrecondition)
        }
        ErrorCode::Unknown if message.starts_with("no such function") => {
            Some(UnavailableKind::Unimplemented)
        }
        _ => None,
    }
}

pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > LEADFLOW_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: LEADFLOW_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_documents.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

fn json_path(field: &str) -> Result<String, StorageError> {
    if field.is_empty()
        || !field
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(StorageError::InvalidQuery(format!(
            "unsupported field name: {field:?}"
        )));
    }
    Ok(format!("$.{field}"))
}

// json_extract yields SQL scalars: booleans come back as 0/1, containers as JSON text.
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn where_clause(
    collection: Collection,
    predicates: &[Predicate],
) -> Result<(String, Vec<SqlValue>), StorageError> {
    let mut sql = String::from("collection = ?1");
    let mut values = vec![SqlValue::Text(collection.as_str().to_string())];

    for predicate in predicates {
        values.push(SqlValue::Text(json_path(predicate.field())?));
        let path_param = values.len();
        match predicate {
            Predicate::Eq { value, .. } if value.is_null() => {
                sql.push_str(&format!(
                    " AND json_extract(body_json, ?{path_param}) IS NULL"
                ));
            }
            Predicate::Eq { value, .. } => {
                values.push(sql_value(value));
                sql.push_str(&format!(
                    " AND json_extract(body_json, ?{path_param}) = ?{}",
                    values.len()
                ));
            }
            Predicate::In { values: members, .. } => {
                let mut placeholders = Vec::new();
                for member in members.iter().filter(|member| !member.is_null()) {
                    values.push(sql_value(member));
                    placeholders.push(format!("?{}", values.len()));
                }
                if placeholders.is_empty() {
                    sql.push_str(" AND 0");
                } else {
                    sql.push_str(&format!(
                        " AND json_extract(body_json, ?{path_param}) IN ({})",
                        placeholders.join(", ")
                    ));
                }
            }
        }
    }

    Ok((sql, values))
}

fn parse_body(body_json: &str) -> Result<Map<String, Value>, StorageError> {
    match serde_json::from_str(body_json)
        .map_err(|err| StorageError::Serialization(err.to_string()))?
    {
        Value::Object(body) => Ok(body),
        _ => Err(StorageError::Serialization(
            "stored document is not a JSON object".to_string(),
        )),
    }
}

fn to_json(body: &Map<String, Value>) -> Result<String, StorageError> {
    serde_json::to_string(body).map_err(|err| StorageError::Serialization(err.to_string()))
}

fn insert_row(
    conn: &Connection,
    collection: Collection,
    body: Map<String, Value>,
) -> Result<Document, StorageError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "
        INSERT INTO documents (collection, doc_id, body_json, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ",
        params![
            collection.as_str(),
            id,
            to_json(&body)?,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(Document { id, body })
}

impl DocumentStore for SqliteDocumentStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn insert(
        &mut self,
        collection: Collection,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError> {
        insert_row(&self.conn, collection, body)
    }

    fn insert_if_absent(
        &mut self,
        collection: Collection,
        key_field: &str,
        body: Map<String, Value>,
    ) -> Result<Option<Document>, StorageError> {
        let path = json_path(key_field)?;
        let key = sql_value(key_value(&body, key_field)?);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
            .query_row(
                "
                SELECT 1
                FROM documents
                WHERE collection = ?1 AND json_extract(body_json, ?2) = ?3
                LIMIT 1
                ",
                params![collection.as_str(), path, key],
                |_| Ok(()),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        let document = insert_row(&tx, collection, body)?;
        tx.commit()?;
        Ok(Some(document))
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        let body_json = self
            .conn
            .query_row(
                "
                SELECT body_json
                FROM documents
                WHERE collection = ?1 AND doc_id = ?2
                ",
                params![collection.as_str(), id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        body_json
            .map(|body_json| {
                Ok(Document {
                    id: id.to_string(),
                    body: parse_body(&body_json)?,
                })
            })
            .transpose()
    }

    fn replace(
        &mut self,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError> {
        let changes = self.conn.execute(
            "
            UPDATE documents
            SET body_json = ?3
            WHERE collection = ?1 AND doc_id = ?2
            ",
            params![collection.as_str(), id, to_json(&body)?],
        )?;
        if changes == 0 {
            return Err(StorageError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(Document {
            id: id.to_string(),
            body,
        })
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
            params![collection.as_str(), id],
        )?;
        Ok(changes > 0)
    }

    fn find(
        &self,
        collection: Collection,
        predicates: &[Predicate],
    ) -> Result<Vec<Document>, StorageError> {
        let (clause, values) = where_clause(collection, predicates)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT doc_id, body_json FROM documents WHERE {clause} ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, body_json) = row?;
            documents.push(Document {
                id,
                body: parse_body(&body_json)?,
            });
        }
        Ok(documents)
    }

    fn count(
        &self,
        collection: Collection,
        predicates: &[Predicate],
    ) -> Result<u64, StorageError> {
        let (clause, values) = where_clause(collection, predicates)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn next_sequence(&mut self, name: &str, floor: u64) -> Result<u64, StorageError> {
        let floor = i64::try_from(floor)
            .map_err(|_| StorageError::InvalidQuery(format!("sequence floor too large: {floor}")))?;
        let value: i64 = self.conn.query_row(
            "
            INSERT INTO sequences (name, value) VALUES (?1, ?2 + 1)
            ON CONFLICT(name) DO UPDATE SET value = MAX(value, ?2) + 1
            RETURNING value
            ",
            params![name, floor],
            |row| row.get(0),
        )?;
        Ok(value.max(0) as u64)
    }
}
