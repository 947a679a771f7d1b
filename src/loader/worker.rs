use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::statistics::LoadStatistics;
use crate::datamodel::{Batch, CollectionName, QueueItem};
use crate::parsing::RecordParser;
use crate::queue::{QueueError, WorkQueue};
use crate::storage::{Destination, StoreError, StoreSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Draining,
    Terminated,
}

/// Workers still taking part in a run.
///
/// Whoever takes the poison pill leaves the roster and passes the pill on
/// only if someone is left to take it, so the queue ends without a pill.
#[derive(Debug)]
pub struct WorkerRoster {
    live: AtomicUsize,
}

impl WorkerRoster {
    pub fn new(workers: usize) -> Self {
        Self {
            live: AtomicUsize::new(workers),
        }
    }

    /// Returns how many workers remain after this one leaves.
    pub fn leave(&self) -> usize {
        match self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| live.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Everything a worker shares with its siblings.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub queue: WorkQueue,
    pub destination: Destination,
    pub parser: Arc<dyn RecordParser>,
    pub statistics: Arc<LoadStatistics>,
    pub roster: Arc<WorkerRoster>,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("fatal store failure: {0}")]
    Store(#[from] StoreError),

    #[error("work queue failure: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub batches: u64,
    pub state: WorkerState,
}

#[derive(Error, Debug)]
#[error("worker {worker_id} failed after {batches} batch(es): {error}")]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub batches: u64,
    #[source]
    pub error: WorkerError,
}

/// Takes batches from the queue and writes them to the destination until
/// it receives the poison pill or the store fails.
#[derive(Debug)]
pub struct LoaderWorker {
    id: usize,
    queue: WorkQueue,
    collection: CollectionName,
    session: Box<dyn StoreSession>,
    parser: Arc<dyn RecordParser>,
    statistics: Arc<LoadStatistics>,
    roster: Arc<WorkerRoster>,
    state: WorkerState,
    batches: u64,
}

impl LoaderWorker {
    /// Opens the worker's store session. It stays open until the worker ends.
    pub async fn connect(id: usize, context: WorkerContext) -> Result<Self, StoreError> {
        let session = context.destination.store.open_session().await?;
        Ok(Self {
            id,
            queue: context.queue,
            collection: context.destination.collection,
            session,
            parser: context.parser,
            statistics: context.statistics,
            roster: context.roster,
            state: WorkerState::Running,
            batches: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub async fn run(mut self) -> Result<WorkerReport, WorkerFailure> {
        debug!(worker = self.id, "Loader worker started");
        let result = self.consume().await;
        self.terminate().await;

        match result {
            Ok(()) => {
                debug!(
                    worker = self.id,
                    batches = self.batches,
                    "Loader worker terminated"
                );
                Ok(WorkerReport {
                    worker_id: self.id,
                    batches: self.batches,
                    state: self.state,
                })
            }
            Err(error) => {
                error!(worker = self.id, "Loader worker aborted: {}", error);
                Err(WorkerFailure {
                    worker_id: self.id,
                    batches: self.batches,
                    error,
                })
            }
        }
    }

    /// Releases the store session of a worker that never ran.
    pub async fn shutdown(mut self) {
        self.roster.leave();
        self.terminate().await;
    }

    async fn consume(&mut self) -> Result<(), WorkerError> {
        loop {
            let item = match self.queue.take().await {
                Ok(item) => item,
                Err(err) => {
                    self.roster.leave();
                    return Err(err.into());
                }
            };

            match item {
                QueueItem::Batch(batch) => {
                    if let Err(err) = self.process_batch(batch).await {
                        // Never took the pill, so nothing to forward.
                        self.roster.leave();
                        return Err(err.into());
                    }
                }
                QueueItem::PoisonPill => {
                    self.state = WorkerState::Draining;
                    let remaining = self.roster.leave();
                    if remaining > 0 {
                        debug!(
                            worker = self.id,
                            remaining, "Forwarding the poison pill"
                        );
                        self.queue.put(QueueItem::PoisonPill).await?;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn process_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        let Batch { sequence, records } = batch;
        self.batches += 1;
        self.statistics.record_batch();

        if records.is_empty() {
            debug!(worker = self.id, sequence, "Skipping empty batch");
            return Ok(());
        }
        self.statistics.record_attempted(records.len() as u64);

        let mut documents = Vec::with_capacity(records.len());
        for record in &records {
            match self.parser.parse(record, sequence) {
                Ok(document) => documents.push(document),
                Err(failure) => {
                    debug!(
                        worker = self.id,
                        sequence, "Skipping unparsable record: {}", failure
                    );
                    self.statistics.record_parse_failure(sequence, &failure);
                }
            }
        }

        let outcome = match self
            .session
            .write_batch(&self.collection, &documents)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.statistics
                    .record_write_aborted(sequence, documents.len() as u64, &err);
                return Err(err);
            }
        };

        for failure in &outcome.failures {
            warn!(
                worker = self.id,
                sequence,
                collection = %self.collection,
                "Document rejected: {}", failure
            );
            self.statistics.record_persist_failure(sequence, failure);
        }
        self.statistics.record_persisted(outcome.persisted as u64);

        let unaccounted = documents
            .len()
            .saturating_sub(outcome.persisted + outcome.rejected());
        if unaccounted > 0 {
            warn!(
                worker = self.id,
                sequence, unaccounted, "Store did not report on every document"
            );
            self.statistics.record_unaccounted(
                sequence,
                unaccounted as u64,
                "not acknowledged by the store",
            );
        }

        debug!(
            worker = self.id,
            sequence,
            records = records.len(),
            persisted = outcome.persisted,
            rejected = outcome.rejected(),
            "Batch processed"
        );
        Ok(())
    }

    async fn terminate(&mut self) {
        if let Err(err) = self.session.close().await {
            warn!(worker = self.id, "Failed to close store session: {}", err);
        }
        self.state = WorkerState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::JsonRecordParser;
    use crate::storage::DocumentStore;
    use crate::storage::memory::MemoryStore;

    const GOOD_A: &str = r#"{"alternate":"C","reference":"T","chromosome":"19","start":45411941,"end":45411941,"geneName":"APOE"}"#;
    const GOOD_B: &str = r#"{"alternate":"A","reference":"G","chromosome":"10","start":129839177,"end":129839177,"geneName":"PTPRE"}"#;

    async fn context(store: &MemoryStore, queue: &WorkQueue, workers: usize) -> WorkerContext {
        let collection = CollectionName::new("testCollection").unwrap();
        store.create_collection(&collection).await.unwrap();
        WorkerContext {
            queue: queue.clone(),
            destination: Destination::new(collection, Arc::new(store.clone())),
            parser: Arc::new(JsonRecordParser::default()),
            statistics: Arc::new(LoadStatistics::new(10)),
            roster: Arc::new(WorkerRoster::new(workers)),
        }
    }

    #[test]
    fn test_roster_never_underflows() {
        let roster = WorkerRoster::new(2);
        assert_eq!(roster.leave(), 1);
        assert_eq!(roster.leave(), 0);
        assert_eq!(roster.leave(), 0);
        assert_eq!(roster.live(), 0);
    }

    #[tokio::test]
    async fn test_single_worker_consumes_until_pill() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new(3).unwrap();
        queue
            .put_batch(Batch::new(0, vec![GOOD_A.into(), GOOD_B.into()]))
            .await
            .unwrap();
        queue
            .put_batch(Batch::new(1, vec!["malformed-json".into()]))
            .await
            .unwrap();
        queue.finish().await.unwrap();

        let context = context(&store, &queue, 1).await;
        let statistics = context.statistics.clone();
        let worker = LoaderWorker::connect(0, context).await.unwrap();
        assert_eq!(worker.state(), WorkerState::Running);
        assert_eq!(store.open_sessions(), 1);

        let report = worker.run().await.unwrap();
        assert_eq!(report.state, WorkerState::Terminated);
        assert_eq!(report.batches, 2);
        assert_eq!(store.open_sessions(), 0);
        // Last worker out does not put the pill back.
        assert!(queue.is_empty());

        let summary = statistics.snapshot();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.persisted, 2);
        assert_eq!(summary.parse_failed, 1);
        assert_eq!(summary.persist_failed, 0);
    }

    #[tokio::test]
    async fn test_pill_is_forwarded_while_siblings_remain() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new(2).unwrap();
        queue.finish().await.unwrap();

        let context = context(&store, &queue, 2).await;
        let roster = context.roster.clone();
        let worker = LoaderWorker::connect(0, context).await.unwrap();
        worker.run().await.unwrap();

        assert_eq!(roster.live(), 1);
        assert_eq!(queue.try_take().unwrap(), Some(QueueItem::PoisonPill));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new(2).unwrap();
        queue.put_batch(Batch::new(0, vec![])).await.unwrap();
        queue.finish().await.unwrap();

        let context = context(&store, &queue, 1).await;
        let statistics = context.statistics.clone();
        let report = LoaderWorker::connect(0, context)
            .await
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.batches, 1);
        let summary = statistics.snapshot();
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.failed(), 0);
        assert_eq!(
            store
                .count(&CollectionName::new("testCollection").unwrap())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_closed_queue_is_fatal() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new(1).unwrap();
        queue.close();

        let context = context(&store, &queue, 1).await;
        let roster = context.roster.clone();
        let failure = LoaderWorker::connect(3, context)
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.worker_id, 3);
        assert!(matches!(failure.error, WorkerError::Queue(QueueError::Closed)));
        assert_eq!(roster.live(), 0);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_session() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new(1).unwrap();
        let context = context(&store, &queue, 1).await;
        let roster = context.roster.clone();
        let worker = LoaderWorker::connect(0, context).await.unwrap();
        assert_eq!(worker.id(), 0);
        assert_eq!(store.open_sessions(), 1);

        worker.shutdown().await;
        assert_eq!(store.open_sessions(), 0);
        assert_eq!(roster.live(), 0);
    }
}
