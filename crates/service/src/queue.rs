//! Bounded in-process queue of conversation ids awaiting analysis.
//!
//! Contents are intentionally volatile: a restart drops pending work, and
//! re-ingesting a conversation re-enqueues it. Duplicate ids are allowed; the
//! worker is idempotent against re-delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

pub struct WorkQueue {
    tx: mpsc::Sender<Uuid>,
    rx: Mutex<mpsc::Receiver<Uuid>>,
    capacity: usize,
    depth: AtomicUsize,
}

impl WorkQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx: Mutex::new(rx), capacity, depth: AtomicUsize::new(0) }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued ids, sampled.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Advisory: whether an enqueue would currently fit. May race with
    /// concurrent enqueues; `enqueue` is the authoritative check.
    #[must_use]
    pub fn can_accept(&self) -> bool {
        self.depth() < self.capacity
    }

    /// Non-blocking enqueue. `false` means the queue is full (backpressure).
    pub fn enqueue(&self, conversation_id: Uuid) -> bool {
        if self.tx.try_send(conversation_id).is_ok() {
            self.depth.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Wait up to `timeout` for the next id; `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Uuid> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(id)) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                Some(id)
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_rejects_once_at_capacity() {
        let queue = WorkQueue::new(2);
        assert!(queue.can_accept());
        assert!(queue.enqueue(Uuid::new_v4()));
        assert!(queue.enqueue(Uuid::new_v4()));
        assert_eq!(queue.depth(), 2);
        assert!(!queue.can_accept());
        assert!(!queue.enqueue(Uuid::new_v4()));
        assert_eq!(queue.depth(), 2);
    }

    #[tokio::test]
    async fn dequeue_is_fifo_and_frees_capacity() {
        let queue = WorkQueue::new(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, Some(first));
        assert!(queue.can_accept());
        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, Some(second));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = WorkQueue::new(4);
        assert_eq!(queue.dequeue(Duration::from_secs(1)).await, None);
    }
}
