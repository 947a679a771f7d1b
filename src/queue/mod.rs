use crate::datamodel::{Batch, QueueItem};
use async_channel::{Receiver, Sender, TryRecvError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Work queue is closed")]
    Closed,

    #[error("Work queue capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
}

/// Bounded hand-off queue shared by producers and loader workers.
///
/// `put` waits while the queue is full and `take` waits while it is empty.
/// Items come out in the order they went in. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
    capacity: usize,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        let (sender, receiver) = async_channel::bounded(capacity);
        Ok(Self {
            sender,
            receiver,
            capacity,
        })
    }

    pub async fn put(&self, item: QueueItem) -> Result<(), QueueError> {
        self.sender.send(item).await.map_err(|_| QueueError::Closed)
    }

    /// Same as [`WorkQueue::put`], for producers running on plain threads.
    /// Must not be called from inside an async task.
    pub fn put_blocking(&self, item: QueueItem) -> Result<(), QueueError> {
        self.sender.send_blocking(item).map_err(|_| QueueError::Closed)
    }

    pub async fn put_batch(&self, batch: Batch) -> Result<(), QueueError> {
        self.put(QueueItem::Batch(batch)).await
    }

    /// Signals the end of the stream. One pill is enough whatever the
    /// number of workers: they forward it to each other.
    pub async fn finish(&self) -> Result<(), QueueError> {
        self.put(QueueItem::PoisonPill).await
    }

    pub async fn take(&self) -> Result<QueueItem, QueueError> {
        self.receiver.recv().await.map_err(|_| QueueError::Closed)
    }

    pub fn try_take(&self) -> Result<Option<QueueItem>, QueueError> {
        match self.receiver.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(QueueError::Closed),
        }
    }

    /// Rejects every later `put`. Items already queued can still be taken.
    /// Returns false if the queue was already closed.
    pub fn close(&self) -> bool {
        self.sender.close()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    fn batch(sequence: u64) -> QueueItem {
        QueueItem::Batch(Batch::new(sequence, vec![format!("record-{sequence}")]))
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(
            WorkQueue::new(0).unwrap_err(),
            QueueError::InvalidCapacity(0)
        );
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new(4).unwrap();
        for sequence in 0..3 {
            queue.put(batch(sequence)).await.unwrap();
        }
        queue.finish().await.unwrap();
        assert_eq!(queue.len(), 4);

        for sequence in 0..3 {
            assert_eq!(queue.take().await.unwrap(), batch(sequence));
        }
        assert_eq!(queue.take().await.unwrap(), QueueItem::PoisonPill);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_put_blocks_while_full() {
        let queue = WorkQueue::new(3).unwrap();
        for sequence in 0..3 {
            queue.put(batch(sequence)).await.unwrap();
        }

        let mut fourth = task::spawn(queue.put(batch(3)));
        assert_pending!(fourth.poll());
        assert_eq!(queue.len(), 3);

        // One take frees one slot and wakes the blocked producer.
        assert_eq!(queue.try_take().unwrap(), Some(batch(0)));
        assert!(fourth.is_woken());
        assert_ready_ok!(fourth.poll());
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_take_blocks_while_empty() {
        let queue = WorkQueue::new(1).unwrap();
        let mut take = task::spawn(queue.take());
        assert_pending!(take.poll());

        queue.put(batch(7)).await.unwrap();
        assert!(take.is_woken());
        assert_eq!(assert_ready_ok!(take.poll()), batch(7));
    }

    #[tokio::test]
    async fn test_close_rejects_put_and_drains_take() {
        let queue = WorkQueue::new(2).unwrap();
        queue.put(batch(0)).await.unwrap();
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());

        assert_eq!(queue.put(batch(1)).await, Err(QueueError::Closed));
        assert_eq!(queue.take().await.unwrap(), batch(0));
        assert_eq!(queue.take().await, Err(QueueError::Closed));
        assert_eq!(queue.try_take(), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_producer() {
        let queue = WorkQueue::new(1).unwrap();
        queue.put(batch(0)).await.unwrap();

        let mut blocked = task::spawn(queue.put(batch(1)));
        assert_pending!(blocked.poll());
        queue.close();
        assert!(blocked.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(blocked.poll()),
            Err(QueueError::Closed)
        );
    }

    #[test]
    fn test_put_blocking_from_thread() {
        let queue = WorkQueue::new(2).unwrap();
        let producer_queue = queue.clone();
        std::thread::spawn(move || {
            producer_queue.put_blocking(batch(0)).unwrap();
            producer_queue.put_blocking(QueueItem::PoisonPill).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(queue.try_take().unwrap(), Some(batch(0)));
        assert_eq!(queue.try_take().unwrap(), Some(QueueItem::PoisonPill));
        assert_eq!(queue.try_take().unwrap(), None);
        assert_eq!(queue.capacity(), 2);
    }
}
