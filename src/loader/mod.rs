pub mod runner;
pub mod statistics;
pub mod worker;

pub use runner::{LoadError, LoadRunner, RunnerOptions};
pub use statistics::{LoadStatistics, LoadSummary, RecordFailure, RecordFailureKind};
pub use worker::{
    LoaderWorker, WorkerContext, WorkerError, WorkerFailure, WorkerReport, WorkerRoster,
    WorkerState,
};
