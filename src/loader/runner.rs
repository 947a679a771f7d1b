use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::statistics::{LoadStatistics, LoadSummary};
use super::worker::{LoaderWorker, WorkerContext, WorkerError, WorkerFailure, WorkerRoster};
use crate::datamodel::QueueItem;
use crate::parsing::RecordParser;
use crate::queue::{QueueError, WorkQueue};
use crate::storage::{Destination, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub workers: usize,
    pub max_reported_failures: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_reported_failures: 100,
        }
    }
}

/// Why a load run did not complete. Apart from invalid options, every
/// variant carries the statistics gathered up to the abort.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid load options: {0}")]
    InvalidOptions(String),

    #[error("Failed to prepare the destination: {source}")]
    Connect {
        #[source]
        source: StoreError,
        summary: Box<LoadSummary>,
    },

    #[error("Load aborted, worker {worker_id} hit a fatal store failure: {source}")]
    Store {
        worker_id: usize,
        #[source]
        source: StoreError,
        summary: Box<LoadSummary>,
    },

    #[error("Load aborted, worker {worker_id} lost the work queue: {source}")]
    Queue {
        worker_id: usize,
        #[source]
        source: QueueError,
        summary: Box<LoadSummary>,
    },

    #[error("Load aborted, a worker panicked: {message}")]
    WorkerPanicked {
        message: String,
        summary: Box<LoadSummary>,
    },
}

impl LoadError {
    pub fn summary(&self) -> Option<&LoadSummary> {
        match self {
            LoadError::InvalidOptions(_) => None,
            LoadError::Connect { summary, .. }
            | LoadError::Store { summary, .. }
            | LoadError::Queue { summary, .. }
            | LoadError::WorkerPanicked { summary, .. } => Some(summary),
        }
    }

    /// The destination could not be reached or broke during the run.
    pub fn is_fatal_store_failure(&self) -> bool {
        matches!(self, LoadError::Connect { .. } | LoadError::Store { .. })
    }
}

enum Abort {
    Worker(WorkerFailure),
    Panic(String),
}

impl Abort {
    fn into_error(self, summary: LoadSummary) -> LoadError {
        let summary = Box::new(summary);
        match self {
            Abort::Worker(WorkerFailure {
                worker_id,
                error: WorkerError::Store(source),
                ..
            }) => LoadError::Store {
                worker_id,
                source,
                summary,
            },
            Abort::Worker(WorkerFailure {
                worker_id,
                error: WorkerError::Queue(source),
                ..
            }) => LoadError::Queue {
                worker_id,
                source,
                summary,
            },
            Abort::Panic(message) => LoadError::WorkerPanicked { message, summary },
        }
    }
}

/// One load session: spawns the workers on a shared queue, waits for all
/// of them and reports what happened.
///
/// Producers signal the end of the stream with a single poison pill
/// ([`WorkQueue::finish`]); workers pass it on to each other.
#[derive(Debug)]
pub struct LoadRunner {
    queue: WorkQueue,
    destination: Destination,
    parser: Arc<dyn RecordParser>,
    options: RunnerOptions,
}

impl LoadRunner {
    pub fn new(
        queue: WorkQueue,
        destination: Destination,
        parser: Arc<dyn RecordParser>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            queue,
            destination,
            parser,
            options,
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Runs the load to completion. Consumes the runner: a runner is good
    /// for exactly one session.
    ///
    /// Record and document failures are counted in the summary and do not
    /// fail the run. A fatal store failure in any worker does, once every
    /// other worker has drained.
    pub async fn run(self) -> Result<LoadSummary, LoadError> {
        let workers = self.options.workers;
        if workers == 0 {
            self.queue.close();
            return Err(LoadError::InvalidOptions(
                "at least one worker is required".to_string(),
            ));
        }

        let statistics = Arc::new(LoadStatistics::new(self.options.max_reported_failures));
        let collection = self.destination.collection.clone();
        info!(
            collection = %collection,
            workers,
            queue_capacity = self.queue.capacity(),
            "Starting load"
        );

        if let Err(source) = self
            .destination
            .store
            .create_collection(&collection)
            .await
        {
            error!(collection = %collection, "Failed to create collection: {}", source);
            self.queue.close();
            return Err(LoadError::Connect {
                source,
                summary: Box::new(statistics.finish()),
            });
        }

        let context = WorkerContext {
            queue: self.queue.clone(),
            destination: self.destination.clone(),
            parser: self.parser.clone(),
            statistics: statistics.clone(),
            roster: Arc::new(WorkerRoster::new(workers)),
        };

        let mut loaders = Vec::with_capacity(workers);
        for id in 0..workers {
            match LoaderWorker::connect(id, context.clone()).await {
                Ok(loader) => loaders.push(loader),
                Err(source) => {
                    error!(worker = id, "Failed to open store session: {}", source);
                    for loader in loaders {
                        loader.shutdown().await;
                    }
                    self.queue.close();
                    return Err(LoadError::Connect {
                        source,
                        summary: Box::new(statistics.finish()),
                    });
                }
            }
        }

        let mut join_set = JoinSet::new();
        for loader in loaders {
            join_set.spawn(loader.run());
        }

        let mut abort: Option<Abort> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(report)) => {
                    debug!(
                        worker = report.worker_id,
                        batches = report.batches,
                        "Worker finished"
                    );
                }
                Ok(Err(failure)) => {
                    warn!("{}", failure);
                    abort.get_or_insert(Abort::Worker(failure));
                }
                Err(join_error) => {
                    error!("Loader worker panicked: {}", join_error);
                    abort.get_or_insert(Abort::Panic(join_error.to_string()));
                }
            }
        }

        self.reclaim_queue(&statistics);
        let summary = statistics.finish();

        match abort {
            None => {
                info!(
                    collection = %collection,
                    attempted = summary.attempted,
                    persisted = summary.persisted,
                    parse_failed = summary.parse_failed,
                    persist_failed = summary.persist_failed,
                    elapsed_ms = summary.elapsed_ms,
                    "Load completed"
                );
                Ok(summary)
            }
            Some(abort) => {
                let error = abort.into_error(summary);
                error!(collection = %collection, "{}", error);
                Err(error)
            }
        }
    }

    /// Every worker is gone: close the queue so producers stop waiting on it,
    /// then empty it. A pill can be left behind when a worker died while
    /// another one was forwarding; batches only when no worker survived.
    fn reclaim_queue(&self, statistics: &LoadStatistics) {
        self.queue.close();

        let mut stray_pills = 0usize;
        while let Ok(Some(item)) = self.queue.try_take() {
            match item {
                QueueItem::PoisonPill => stray_pills += 1,
                QueueItem::Batch(batch) => {
                    warn!(
                        sequence = batch.sequence,
                        records = batch.len(),
                        "Batch abandoned, no worker left to process it"
                    );
                    statistics.record_abandoned_batch();
                }
            }
        }
        if stray_pills > 0 {
            debug!(stray_pills, "Removed leftover poison pill(s) from the queue");
        }
    }
}
