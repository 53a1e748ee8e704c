//! Unbounded FIFO buffer between producer threads and the stage consumer.
//!
//! Producers never block: `push` takes the lock only long enough to append.
//! The single consumer blocks in `take` until an entry arrives. Closing the
//! queue, discarding its contents and appending the termination entry
//! happen in one critical section, so no request can slip in between the
//! purge and the wake-up.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use rofilter_core::Request;

/// An entry dequeued by the consumer.
#[derive(Debug)]
pub enum QueueEntry {
    /// A client request to classify.
    Request(Request),
    /// Internal marker that wakes a blocked consumer during shutdown.
    /// Never forwarded or replied to.
    RequestOfDeath,
}

#[derive(Debug, Default)]
struct QueueInner {
    entries: VecDeque<QueueEntry>,
    closed: bool,
}

/// Thread-safe unbounded queue with a blocking take.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request` to the tail.
    ///
    /// Returns the request back if the queue has been closed.
    ///
    /// # Errors
    ///
    /// Returns `Err(request)` when the queue no longer accepts work.
    pub fn push(&self, request: Request) -> Result<(), Request> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(request);
        }
        inner.entries.push_back(QueueEntry::Request(request));
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the head, waiting while the queue is empty.
    pub fn take(&self) -> QueueEntry {
        let mut inner = self.inner.lock();
        loop {
            if let Some(entry) = inner.entries.pop_front() {
                return entry;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Closes the queue, discards every queued request and appends the
    /// termination entry. Returns the number of requests discarded.
    ///
    /// A queue that is already closed gets no termination entry: its
    /// consumer has left.
    pub fn terminate(&self) -> usize {
        let mut inner = self.inner.lock();
        let already_closed = inner.closed;
        inner.closed = true;
        let purged = Self::purge(&mut inner);
        if already_closed {
            return purged;
        }
        inner.entries.push_back(QueueEntry::RequestOfDeath);
        drop(inner);
        self.available.notify_one();
        purged
    }

    /// Closes the queue and discards whatever is still in it, including a
    /// pending termination entry. Returns the number of requests discarded.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let purged = Self::purge(&mut inner);
        inner.entries.clear();
        purged
    }

    /// Number of entries currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn purge(inner: &mut QueueInner) -> usize {
        let before = inner.entries.len();
        inner
            .entries
            .retain(|entry| matches!(entry, QueueEntry::RequestOfDeath));
        before - inner.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use rofilter_core::OpCode;

    use super::*;
    use crate::test_support::{request, RecordingChannel};

    fn cxid_of(entry: QueueEntry) -> i32 {
        match entry {
            QueueEntry::Request(r) => r.cxid,
            QueueEntry::RequestOfDeath => panic!("unexpected termination entry"),
        }
    }

    #[test]
    fn take_returns_entries_in_push_order() {
        let queue = RequestQueue::new();
        let channel = RecordingChannel::new();
        for cxid in 1..=3 {
            queue.push(request(cxid, OpCode::GetData, &channel)).unwrap();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(cxid_of(queue.take()), 1);
        assert_eq!(cxid_of(queue.take()), 2);
        assert_eq!(cxid_of(queue.take()), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn terminate_purges_then_appends_marker() {
        let queue = RequestQueue::new();
        let channel = RecordingChannel::new();
        queue.push(request(1, OpCode::GetData, &channel)).unwrap();
        queue.push(request(2, OpCode::Create, &channel)).unwrap();

        assert_eq!(queue.terminate(), 2);
        assert_eq!(queue.len(), 1);
        assert!(matches!(queue.take(), QueueEntry::RequestOfDeath));
    }

    #[test]
    fn push_after_terminate_is_refused() {
        let queue = RequestQueue::new();
        let channel = RecordingChannel::new();
        queue.terminate();

        let refused = queue.push(request(7, OpCode::GetData, &channel));
        assert_eq!(refused.map_err(|r| r.cxid), Err(7));
        assert!(queue.is_closed());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn close_discards_marker_too() {
        let queue = RequestQueue::new();
        let channel = RecordingChannel::new();
        queue.push(request(1, OpCode::GetData, &channel)).unwrap();
        queue.terminate();

        assert_eq!(queue.close(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn terminate_after_close_leaves_queue_empty() {
        let queue = RequestQueue::new();
        let channel = RecordingChannel::new();
        queue.push(request(1, OpCode::GetData, &channel)).unwrap();
        queue.close();

        assert_eq!(queue.terminate(), 0);
        assert!(queue.is_empty());
        assert!(queue.is_closed());
    }

    #[test]
    fn second_terminate_does_not_stack_markers() {
        let queue = RequestQueue::new();
        queue.terminate();
        queue.terminate();

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn blocked_take_wakes_on_terminate() {
        let queue = Arc::new(RequestQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take())
        };

        thread::sleep(Duration::from_millis(20));
        queue.terminate();

        let entry = consumer.join().unwrap();
        assert!(matches!(entry, QueueEntry::RequestOfDeath));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(RequestQueue::new());
        let channel = RecordingChannel::new();

        thread::scope(|scope| {
            for producer in 0..8 {
                let queue = &queue;
                let channel = &channel;
                scope.spawn(move || {
                    for i in 0..250 {
                        queue
                            .push(request(producer * 1000 + i, OpCode::Exists, channel))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(queue.len(), 2000);
    }
}
