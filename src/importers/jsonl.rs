use anyhow::{Context, Result, anyhow};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::datamodel::{Batch, QueueItem};
use crate::queue::WorkQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub batches: u64,
    pub records: u64,
    /// Lines skipped because they are not valid UTF-8.
    pub invalid_lines: u64,
}

/// Opens a JSON-lines file, gunzipping it when the name ends in `.gz`.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let is_gzip = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("gz"));

    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads one record per line and hands them to the queue in batches of at
/// most `batch_size`, then enqueues the poison pill.
///
/// Blocks on a full queue, so it has to run on its own thread. The pill is
/// sent even when reading fails halfway, so that workers do not wait forever.
pub fn import_reader<R: BufRead>(
    reader: R,
    queue: &WorkQueue,
    batch_size: usize,
) -> Result<ImportSummary> {
    if batch_size == 0 {
        queue
            .put_blocking(QueueItem::PoisonPill)
            .context("Failed to enqueue the poison pill")?;
        return Err(anyhow!("Batch size is 0"));
    }

    let result = send_batches(reader, queue, batch_size);

    match &result {
        Ok(summary) => info!(
            batches = summary.batches,
            records = summary.records,
            invalid_lines = summary.invalid_lines,
            "Import finished"
        ),
        Err(err) => warn!("Import stopped early: {:#}", err),
    }

    // If the queue is already closed there is nobody left to stop.
    if let Err(err) = queue.put_blocking(QueueItem::PoisonPill) {
        debug!("Poison pill not enqueued: {}", err);
    }

    result
}

fn send_batches<R: BufRead>(
    mut reader: R,
    queue: &WorkQueue,
    batch_size: usize,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut records = Vec::with_capacity(batch_size);
    let mut buffer = Vec::new();
    let mut line_number = 0u64;

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => line_number += 1,
            Err(err) => {
                // Whatever was read before the failure still goes out.
                flush_batch(queue, &mut summary, &mut records, batch_size)?;
                return Err(err)
                    .with_context(|| format!("Failed to read line {}", line_number + 1));
            }
        }

        let line = match std::str::from_utf8(&buffer) {
            Ok(line) => line,
            Err(err) => {
                warn!(line = line_number, "Skipping line that is not valid UTF-8: {}", err);
                summary.invalid_lines += 1;
                continue;
            }
        };
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        records.push(line.to_string());
        summary.records += 1;

        if records.len() == batch_size {
            flush_batch(queue, &mut summary, &mut records, batch_size)?;
        }
    }

    flush_batch(queue, &mut summary, &mut records, batch_size)?;
    Ok(summary)
}

fn flush_batch(
    queue: &WorkQueue,
    summary: &mut ImportSummary,
    records: &mut Vec<String>,
    batch_size: usize,
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let batch = Batch::new(
        summary.batches,
        std::mem::replace(records, Vec::with_capacity(batch_size)),
    );
    queue
        .put_blocking(QueueItem::Batch(batch))
        .context("Failed to enqueue batch")?;
    summary.batches += 1;
    Ok(())
}

/// Runs [`import_reader`] on a file from a blocking thread.
pub fn spawn_file_import(
    path: PathBuf,
    queue: WorkQueue,
    batch_size: usize,
) -> JoinHandle<Result<ImportSummary>> {
    tokio::task::spawn_blocking(move || {
        let reader = match open_input(&path) {
            Ok(reader) => reader,
            Err(err) => {
                let _ = queue.put_blocking(QueueItem::PoisonPill);
                return Err(err);
            }
        };
        info!(path = %path.display(), batch_size, "Importing records");
        import_reader(reader, &queue, batch_size)
    })
}
