use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::common::{StoredDocument, document_key};
use super::{DocumentFailure, DocumentStore, StoreError, StoreSession, WriteOutcome};
use crate::datamodel::{CollectionName, ParsedDocument};

#[derive(Debug, Default)]
struct MemoryCollection {
    keys: HashSet<String>,
    documents: Vec<StoredDocument>,
}

/// In-process document store. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<CollectionName, MemoryCollection>>>,
    open_sessions: Arc<AtomicUsize>,
    sessions_opened: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened since the store was created.
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, collection: &CollectionName) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.clone()).or_default();
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            store: self.clone(),
            open: true,
        }))
    }

    async fn read_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.documents.clone())
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    async fn count(&self, collection: &CollectionName) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.documents.len() as u64)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }
}

#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    open: bool,
}

impl MemorySession {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.store.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn write_batch(
        &mut self,
        collection: &CollectionName,
        documents: &[ParsedDocument],
    ) -> Result<WriteOutcome, StoreError> {
        if !self.open {
            return Err(StoreError::SessionClosed);
        }
        if documents.is_empty() {
            return Ok(WriteOutcome::default());
        }

        // The whole batch is applied under one lock, so readers never see half of it.
        let mut collections = self.store.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut outcome = WriteOutcome::default();
        for (index, document) in documents.iter().enumerate() {
            let key = match document_key(document) {
                Ok(key) => key,
                Err(reason) => {
                    outcome
                        .failures
                        .push(DocumentFailure::schema_violation(index, reason));
                    continue;
                }
            };
            if !target.keys.insert(key.clone()) {
                outcome
                    .failures
                    .push(DocumentFailure::duplicate_key(index, key));
                continue;
            }
            target.documents.push(StoredDocument {
                key,
                batch_sequence: document.batch_sequence,
                body: document.body.clone(),
            });
            outcome.persisted += 1;
        }

        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FailureKind;
    use serde_json::{Value, json};

    fn document(sequence: u64, body: Value) -> ParsedDocument {
        let Value::Object(body) = body else {
            panic!("test documents are objects");
        };
        ParsedDocument::new(sequence, body)
    }

    fn collection() -> CollectionName {
        CollectionName::new("testCollection").unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();
        let mut session = store.open_session().await.unwrap();

        let documents = vec![
            document(0, json!({"geneName": "APOE", "start": 45411941})),
            document(0, json!({"_id": "rs429358", "geneName": "APOE"})),
        ];
        let outcome = session
            .write_batch(&collection(), &documents)
            .await
            .unwrap();
        assert_eq!(outcome.persisted, 2);
        assert!(outcome.is_complete());

        let stored = store.read_collection(&collection()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].body, documents[0].body);
        assert_eq!(stored[1].key, "rs429358");
        assert_eq!(stored[1].body, documents[1].body);
        assert_eq!(store.count(&collection()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_partial_failures() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();
        let mut session = store.open_session().await.unwrap();

        let documents = vec![
            document(1, json!({"_id": "a"})),
            document(1, json!({"_id": "a"})),
            document(1, json!({"_id": [1, 2]})),
            document(1, json!({"_id": "b"})),
        ];
        let outcome = session
            .write_batch(&collection(), &documents)
            .await
            .unwrap();
        assert_eq!(outcome.persisted, 2);
        assert_eq!(outcome.rejected(), 2);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::DuplicateKey);
        assert_eq!(outcome.failures[1].index, 2);
        assert_eq!(outcome.failures[1].kind, FailureKind::SchemaViolation);
    }

    #[tokio::test]
    async fn test_empty_write_is_a_noop() {
        let store = MemoryStore::new();
        let mut session = store.open_session().await.unwrap();
        // Not even the missing collection is noticed.
        let outcome = session.write_batch(&collection(), &[]).await.unwrap();
        assert_eq!(outcome, WriteOutcome::default());
    }

    #[tokio::test]
    async fn test_missing_collection_is_fatal() {
        let store = MemoryStore::new();
        let mut session = store.open_session().await.unwrap();
        let result = session
            .write_batch(&collection(), &[document(0, json!({"a": 1}))])
            .await;
        assert!(matches!(result, Err(StoreError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_session_release_is_idempotent() {
        let store = MemoryStore::new();
        let mut first = store.open_session().await.unwrap();
        let second = store.open_session().await.unwrap();
        assert_eq!(store.open_sessions(), 2);

        first.close().await.unwrap();
        first.close().await.unwrap();
        assert!(first.is_closed());
        assert_eq!(store.open_sessions(), 1);

        let result = first.write_batch(&collection(), &[]).await;
        assert!(matches!(result, Err(StoreError::SessionClosed)));

        drop(first);
        drop(second);
        assert_eq!(store.open_sessions(), 0);
        assert_eq!(store.sessions_opened(), 2);
    }
}
