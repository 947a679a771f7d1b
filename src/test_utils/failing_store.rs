use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::datamodel::{CollectionName, ParsedDocument};
use crate::storage::memory::MemoryStore;
use crate::storage::{DocumentStore, StoreError, StoreSession, StoredDocument, WriteOutcome};

/// A [`MemoryStore`] that breaks on demand.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    /// 1-based index of the write call, across all sessions, that loses the connection.
    fail_on_write: Option<usize>,
    /// Number of sessions that can be opened before the store refuses more.
    session_limit: Option<usize>,
    write_delay: Option<Duration>,
    writes: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_write(mut self, call: usize) -> Self {
        self.fail_on_write = Some(call);
        self
    }

    pub fn session_limit(mut self, limit: usize) -> Self {
        self.session_limit = Some(limit);
        self
    }

    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Write calls made so far, the failing one included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn create_collection(&self, collection: &CollectionName) -> Result<(), StoreError> {
        self.inner.create_collection(collection).await
    }

    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let opened = self.sessions.fetch_add(1, Ordering::SeqCst);
        if self.session_limit.is_some_and(|limit| opened >= limit) {
            return Err(StoreError::Connection("too many connections".to_string()));
        }
        Ok(Box::new(FailingSession {
            inner: self.inner.open_session().await?,
            store: self.clone(),
        }))
    }

    async fn read_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner.read_collection(collection).await
    }

    async fn count(&self, collection: &CollectionName) -> Result<u64, StoreError> {
        self.inner.count(collection).await
    }
}

#[derive(Debug)]
struct FailingSession {
    inner: Box<dyn StoreSession>,
    store: FailingStore,
}

#[async_trait]
impl StoreSession for FailingSession {
    async fn write_batch(
        &mut self,
        collection: &CollectionName,
        documents: &[ParsedDocument],
    ) -> Result<WriteOutcome, StoreError> {
        // Empty writes never reach the store, so they are not counted either.
        if documents.is_empty() {
            return self.inner.write_batch(collection, documents).await;
        }
        let call = self.store.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.store.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.store.fail_on_write == Some(call) {
            return Err(StoreError::Connection(format!(
                "connection reset during write #{}",
                call
            )));
        }
        self.inner.write_batch(collection, documents).await
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{JsonRecordParser, RecordParser};
    use crate::test_utils::fixtures::variant_batches;

    #[tokio::test]
    async fn test_empty_write_is_neither_counted_nor_failed() {
        let store = FailingStore::new().fail_on_write(1);
        let collection = CollectionName::new("testCollection").unwrap();
        store.create_collection(&collection).await.unwrap();
        let mut session = store.open_session().await.unwrap();

        let outcome = session.write_batch(&collection, &[]).await.unwrap();
        assert_eq!(outcome, WriteOutcome::default());
        assert_eq!(store.writes(), 0);

        let parser = JsonRecordParser::default();
        let documents: Vec<ParsedDocument> = variant_batches(1, 2)[0]
            .records
            .iter()
            .map(|record| parser.parse(record, 0).unwrap())
            .collect();
        let err = session.write_batch(&collection, &documents).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.writes(), 1);

        session.close().await.unwrap();
        assert!(matches!(
            session.write_batch(&collection, &[]).await,
            Err(StoreError::SessionClosed)
        ));
    }
}
