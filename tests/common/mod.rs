#![allow(dead_code)] // Each test binary uses a different subset

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use varload::datamodel::{Batch, CollectionName};
use varload::loader::{LoadRunner, RunnerOptions};
use varload::parsing::{JsonRecordParser, RecordParser};
use varload::queue::{QueueError, WorkQueue};
use varload::storage::{Destination, DocumentStore};

pub fn test_collection() -> CollectionName {
    CollectionName::new("testCollection").unwrap()
}

pub fn runner(queue: &WorkQueue, store: Arc<dyn DocumentStore>, workers: usize) -> LoadRunner {
    runner_with_parser(queue, store, workers, Arc::new(JsonRecordParser::default()))
}

pub fn runner_with_parser(
    queue: &WorkQueue,
    store: Arc<dyn DocumentStore>,
    workers: usize,
    parser: Arc<dyn RecordParser>,
) -> LoadRunner {
    LoadRunner::new(
        queue.clone(),
        Destination::new(test_collection(), store),
        parser,
        RunnerOptions {
            workers,
            max_reported_failures: 100,
        },
    )
}

/// Feeds the batches and then the poison pill from a separate task.
pub fn spawn_producer(
    queue: &WorkQueue,
    batches: Vec<Batch>,
) -> JoinHandle<Result<(), QueueError>> {
    let queue = queue.clone();
    tokio::spawn(async move {
        for batch in batches {
            queue.put_batch(batch).await?;
        }
        queue.finish().await
    })
}

/// SQLite database file removed on drop.
pub struct TempSqlite {
    path: PathBuf,
}

impl TempSqlite {
    pub fn new() -> Self {
        let path =
            std::env::temp_dir().join(format!("varload_test_{}.db", Uuid::new_v4().simple()));
        Self { path }
    }

    pub fn connection_string(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempSqlite {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}
