/// A group of raw records moved through the work queue as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    /// Position of the batch in the producer's output, for diagnostics.
    pub sequence: u64,
    pub records: Vec<String>,
}

impl Batch {
    pub fn new(sequence: u64, records: Vec<String>) -> Self {
        Self { sequence, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What travels through the work queue.
///
/// The poison pill is its own variant, so an empty batch can never be
/// mistaken for the end of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Batch(Batch),
    PoisonPill,
}

impl QueueItem {
    pub fn is_poison_pill(&self) -> bool {
        matches!(self, QueueItem::PoisonPill)
    }
}

impl From<Batch> for QueueItem {
    fn from(batch: Batch) -> Self {
        QueueItem::Batch(batch)
    }
}
