//! Bounded staging queue.

use crate::error::QueueError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    /// Keep items sorted by `(-priority, arrival)` instead of plain FIFO.
    pub priority_ordered: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            priority_ordered: true,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_capacity(mut self, c: usize) -> Self {
        self.capacity = c;
        self
    }
    pub fn with_priority_ordering(mut self, p: bool) -> Self {
        self.priority_ordered = p;
        self
    }
}

#[derive(Debug, Clone)]
pub struct QueueItem<T> {
    pub data: T,
    pub priority: i32,
    pub enqueued_at: Instant,
    seq: u64,
}

struct Inner<T> {
    items: VecDeque<QueueItem<T>>,
    next_seq: u64,
}

/// Priority-ordered (or FIFO) bounded queue.
///
/// Every operation takes the same lock, so the queue has a single logical
/// owner at any time.
pub struct BatchQueue<T> {
    config: QueueConfig,
    inner: Mutex<Inner<T>>,
}

impl<T> BatchQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an item; returns the queue length afterwards.
    pub fn enqueue(&self, data: T, priority: i32) -> Result<usize, QueueError> {
        let mut inner = self.lock();
        if inner.items.len() >= self.config.capacity {
            return Err(QueueError::Full {
                capacity: self.config.capacity,
            });
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let item = QueueItem {
            data,
            priority,
            enqueued_at: Instant::now(),
            seq,
        };
        if self.config.priority_ordered {
            // Equal priorities keep arrival order: insert after every item
            // with priority >= ours.
            let pos = inner.items.partition_point(|i| i.priority >= priority);
            inner.items.insert(pos, item);
        } else {
            inner.items.push_back(item);
        }
        Ok(inner.items.len())
    }

    pub fn dequeue(&self) -> Result<QueueItem<T>, QueueError> {
        self.lock().items.pop_front().ok_or(QueueError::Empty)
    }

    /// Remove everything, in drain order.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).map(|i| i.data).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
    pub fn clear(&self) {
        self.lock().items.clear();
    }
}

impl<T: Clone> BatchQueue<T> {
    pub fn peek(&self) -> Option<QueueItem<T>> {
        self.lock().items.front().cloned()
    }
}

impl<T> QueueItem<T> {
    /// Arrival sequence number within the queue.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}
