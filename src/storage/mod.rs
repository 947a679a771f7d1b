use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::datamodel::{CollectionName, ParsedDocument};

pub mod common;
pub mod error;
pub mod memory;
pub mod outcome;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod storage_factory;

pub use common::{DOCUMENT_KEY_FIELD, StoredDocument};
pub use error::StoreError;
pub use outcome::{DocumentFailure, FailureKind, WriteOutcome};

/// A backing store able to hold collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Creates the collection if it does not exist yet.
    async fn create_collection(&self, collection: &CollectionName) -> Result<(), StoreError>;

    /// Opens a session for one worker. Sessions are not shared between workers.
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    async fn read_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    async fn count(&self, collection: &CollectionName) -> Result<u64, StoreError>;
}

/// A worker's connection to the store.
///
/// `write_batch` returns `Err` only for failures that make the session
/// unusable. Rejected documents are listed in the [`WriteOutcome`].
#[async_trait]
pub trait StoreSession: Send + Debug {
    async fn write_batch(
        &mut self,
        collection: &CollectionName,
        documents: &[ParsedDocument],
    ) -> Result<WriteOutcome, StoreError>;

    /// Releases the session. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), StoreError>;

    fn is_closed(&self) -> bool;
}

/// Where a load run writes to. Shared read-only by all workers, each of
/// them opening its own session on the store.
#[derive(Debug, Clone)]
pub struct Destination {
    pub collection: CollectionName,
    pub store: Arc<dyn DocumentStore>,
}

impl Destination {
    pub fn new(collection: CollectionName, store: Arc<dyn DocumentStore>) -> Self {
        Self { collection, store }
    }
}
