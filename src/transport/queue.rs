// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Bounded FIFO backlog of encoded wire records awaiting transmission.
///
/// Overflow evicts the oldest entry; `push` never blocks and never fails.
/// Records are owned by the queue between `push` and `pop`. The storage is
/// reserved up front so a `push` after construction never reallocates, which
/// keeps the signal handler's enqueue path off the allocator except for the
/// record itself.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    entries: VecDeque<String>,
    capacity: usize,
    evicted: u64,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::with_capacity(capacity + 1),
                capacity,
                evicted: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the queue state is still structurally valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, record: String) {
        let mut inner = self.lock();
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
        }
        inner.entries.push_back(record);
    }

    /// Returns a record to the head of the queue. Used when a transmit fails
    /// after the record was already popped, preserving FIFO order for the
    /// next drain.
    pub fn push_front(&self, record: String) {
        let mut inner = self.lock();
        if inner.entries.len() >= inner.capacity {
            // Requeueing at the head must not grow past the bound; the entry
            // competing for the slot is the newest, so drop from the tail.
            inner.entries.pop_back();
            inner.evicted += 1;
        }
        inner.entries.push_front(record);
    }

    pub fn pop(&self) -> Option<String> {
        self.lock().entries.pop_front()
    }

    pub fn non_empty(&self) -> bool {
        !self.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Total entries dropped to overflow since construction.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new(10);
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.push("c".to_string());
        assert_eq!(queue.pop().as_deref(), Some("a"));
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert_eq!(queue.pop().as_deref(), Some("c"));
        assert_eq!(queue.pop(), None);
        assert!(!queue.non_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = MessageQueue::new(3);
        for record in ["r1", "r2", "r3", "r4", "r5"] {
            queue.push(record.to_string());
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.evicted(), 2);
        assert_eq!(queue.pop().as_deref(), Some("r3"));
        assert_eq!(queue.pop().as_deref(), Some("r4"));
        assert_eq!(queue.pop().as_deref(), Some("r5"));
    }

    #[test]
    fn test_bound_holds_under_interleaving() {
        let queue = MessageQueue::new(5);
        for i in 0..100 {
            queue.push(format!("r{i}"));
            if i % 3 == 0 {
                queue.pop();
            }
            assert!(queue.len() <= 5);
        }
    }

    #[test]
    fn test_push_front_requeues_at_head() {
        let queue = MessageQueue::new(3);
        queue.push("b".to_string());
        queue.push("c".to_string());
        queue.push_front("a".to_string());
        assert_eq!(queue.pop().as_deref(), Some("a"));
        assert_eq!(queue.pop().as_deref(), Some("b"));
    }

    #[test]
    fn test_concurrent_producers() {
        use std::sync::Arc;
        let queue = Arc::new(MessageQueue::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(format!("t{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.evicted(), 350);
    }
}
