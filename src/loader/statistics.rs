use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::parsing::ParseFailure;
use crate::storage::{DocumentFailure, StoreError};

// Long records are cut in failure samples.
const MAX_SAMPLE_RECORD_CHARS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailureKind {
    Parse,
    Persist,
}

/// One failed record, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub batch_sequence: u64,
    pub kind: RecordFailureKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
}

/// Counters shared by every worker of a run.
#[derive(Debug)]
pub struct LoadStatistics {
    attempted: AtomicU64,
    persisted: AtomicU64,
    parse_failed: AtomicU64,
    persist_failed: AtomicU64,
    batches: AtomicU64,
    abandoned_batches: AtomicU64,
    started: Instant,
    elapsed: OnceLock<Duration>,
    max_reported_failures: usize,
    failures: Mutex<Vec<RecordFailure>>,
}

/// Snapshot of [`LoadStatistics`], what a caller gets back from a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub attempted: u64,
    pub persisted: u64,
    pub parse_failed: u64,
    pub persist_failed: u64,
    pub batches: u64,
    pub abandoned_batches: u64,
    pub elapsed_ms: u64,
    pub failures: Vec<RecordFailure>,
}

impl LoadSummary {
    pub fn failed(&self) -> u64 {
        self.parse_failed + self.persist_failed
    }

    /// True when every attempted record made it to the store.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.abandoned_batches == 0
    }
}

fn truncate(record: &str) -> String {
    record.chars().take(MAX_SAMPLE_RECORD_CHARS).collect()
}

impl LoadStatistics {
    pub fn new(max_reported_failures: usize) -> Self {
        Self {
            attempted: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            parse_failed: AtomicU64::new(0),
            persist_failed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            abandoned_batches: AtomicU64::new(0),
            started: Instant::now(),
            elapsed: OnceLock::new(),
            max_reported_failures,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempted(&self, count: u64) {
        self.attempted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, count: u64) {
        self.persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self, batch_sequence: u64, failure: &ParseFailure) {
        self.parse_failed.fetch_add(1, Ordering::Relaxed);
        self.sample(RecordFailure {
            batch_sequence,
            kind: RecordFailureKind::Parse,
            reason: failure.reason.to_string(),
            record: Some(truncate(&failure.raw)),
        });
    }

    pub fn record_persist_failure(&self, batch_sequence: u64, failure: &DocumentFailure) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
        self.sample(RecordFailure {
            batch_sequence,
            kind: RecordFailureKind::Persist,
            reason: failure.to_string(),
            record: failure.key.clone(),
        });
    }

    /// Counts documents the store neither persisted nor rejected.
    pub fn record_unaccounted(&self, batch_sequence: u64, count: u64, reason: &str) {
        if count == 0 {
            return;
        }
        self.persist_failed.fetch_add(count, Ordering::Relaxed);
        self.sample(RecordFailure {
            batch_sequence,
            kind: RecordFailureKind::Persist,
            reason: format!("{} document(s): {}", count, reason),
            record: None,
        });
    }

    /// Counts every document of a batch whose write failed fatally.
    pub fn record_write_aborted(&self, batch_sequence: u64, count: u64, error: &StoreError) {
        self.record_unaccounted(batch_sequence, count, &error.to_string());
    }

    pub fn record_abandoned_batch(&self) {
        self.abandoned_batches.fetch_add(1, Ordering::Relaxed);
    }

    fn sample(&self, failure: RecordFailure) {
        if self.max_reported_failures == 0 {
            return;
        }
        // A poisoned lock only loses diagnostics, never counts.
        if let Ok(mut failures) = self.failures.lock() {
            if failures.len() < self.max_reported_failures {
                failures.push(failure);
            }
        }
    }

    /// Freezes the elapsed time. Counters must not move after this.
    pub fn finish(&self) -> LoadSummary {
        let _ = self.elapsed.set(self.started.elapsed());
        self.snapshot()
    }

    pub fn snapshot(&self) -> LoadSummary {
        let elapsed = self
            .elapsed
            .get()
            .copied()
            .unwrap_or_else(|| self.started.elapsed());
        let failures = self
            .failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default();

        LoadSummary {
            attempted: self.attempted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            parse_failed: self.parse_failed.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            abandoned_batches: self.abandoned_batches.load(Ordering::Relaxed),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            failures,
        }
    }
}
