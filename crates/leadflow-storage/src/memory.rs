use crate::{key_value, BackendKind, Collection, Document, DocumentStore, Predicate, StorageError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Process-local store. Also serves as the degraded-mode fallback.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: BTreeMap<Collection, Vec<Document>>,
    sequences: BTreeMap<String, u64>,
    next_id: u64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self, collection: Collection) -> &[Document] {
        self.collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{}", self.next_id)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn insert(
        &mut self,
        collection: Collection,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError> {
        let document = Document {
            id: self.allocate_id(),
            body,
        };
        self.collections
            .entry(collection)
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    fn insert_if_absent(
        &mut self,
        collection: Collection,
        key_field: &str,
        body: Map<String, Value>,
    ) -> Result<Option<Document>, StorageError> {
        let key = key_value(&body, key_field)?;
        let exists = self
            .documents(collection)
            .iter()
            .any(|document| document.body.get(key_field) == Some(key));
        if exists {
            return Ok(None);
        }
        self.insert(collection, body).map(Some)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        Ok(self
            .documents(collection)
            .iter()
            .find(|document| document.id == id)
            .cloned())
    }

    fn replace(
        &mut self,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StorageError> {
        let slot = self
            .collections
            .get_mut(&collection)
            .and_then(|documents| documents.iter_mut().find(|document| document.id == id))
            .ok_or_else(|| StorageError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        slot.body = body;
        Ok(slot.clone())
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        let Some(documents) = self.collections.get_mut(&collection) else {
            return Ok(false);
        };
        let before = documents.len();
        documents.retain(|document| document.id != id);
        Ok(documents.len() < before)
    }

    fn find(
        &self,
        collection: Collection,
        predicates: &[Predicate],
    ) -> Result<Vec<Document>, StorageError> {
        Ok(self
            .documents(collection)
            .iter()
            .filter(|document| predicates.iter().all(|p| p.matches(&document.body)))
            .cloned()
            .collect())
    }

    fn count(
        &self,
        collection: Collection,
        predicates: &[Predicate],
    ) -> Result<u64, StorageError> {
        Ok(self
            .documents(collection)
            .iter()
            .filter(|document| predicates.iter().all(|p| p.matches(&document.body)))
            .count() as u64)
    }

    fn next_sequence(&mut self, name: &str, floor: u64) -> Result<u64, StorageError> {
        let value = self.sequences.entry(name.to_string()).or_insert(0);
        *value = (*value).max(floor) + 1;
        Ok(*value)
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
    fn insert_if_absent_keys_on_field_value() {
        let mut store = MemoryDocumentStore::new();
        let first = store
            .insert_if_absent(Collection::Phonebook, "contact", body(json!({"contact": "555"})))
            .expect("insert");
        assert!(first.is_some());
        let second = store
            .insert_if_absent(Collection::Phonebook, "contact", body(json!({"contact": "555"})))
            .expect("insert");
        assert!(second.is_none());
        assert_eq!(store.count(Collection::Phonebook, &[]).expect("count"), 1);

        let err = store
            .insert_if_absent(Collection::Phonebook, "contact", body(json!({"name": "x"})))
            .expect_err("missing key");
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }

    #[test]
    fn replace_and_delete_report_missing_documents() {
        let mut store = MemoryDocumentStore::new();
        let doc = store
            .insert(Collection::Leads, body(json!({"status": "New"})))
            .expect("insert");

        let replaced = store
            .replace(Collection::Leads, &doc.id, body(json!({"status": "Dead"})))
            .expect("replace");
        assert_eq!(replaced.body["status"], "Dead");
        assert!(matches!(
            store.replace(Collection::Leads, "missing", Map::new()),
            Err(StorageError::NotFound { .. })
        ));

        assert!(store.delete(Collection::Leads, &doc.id).expect("delete"));
        assert!(!store.delete(Collection::Leads, &doc.id).expect("delete again"));
        assert!(!store.delete(Collection::Rates, "nothing").expect("delete empty"));
    }

    #[test]
    fn find_keeps_insertion_order_and_collections_apart() {
        let mut store = MemoryDocumentStore::new();
        for status in ["New", "Dead", "New"] {
            store
                .insert(Collection::Leads, body(json!({"status": status})))
                .expect("insert");
        }
        store
            .insert(Collection::Rates, body(json!({"status": "New"})))
            .expect("insert rate");

        let found = store
            .find(Collection::Leads, &[Predicate::eq("status", "New")])
            .expect("find");
        let ids = found.iter().map(|doc| doc.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["mem-1", "mem-3"]);
    }

    #[test]
    fn sequences_never_go_backwards() {
        let mut store = MemoryDocumentStore::new();
        assert_eq!(store.next_sequence("leads", 0).expect("seq"), 1);
        assert_eq!(store.next_sequence("leads", 0).expect("seq"), 2);
        assert_eq!(store.next_sequence("leads", 10).expect("seq"), 11);
        assert_eq!(store.next_sequence("leads", 3).expect("seq"), 12);
    }
}
