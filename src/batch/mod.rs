//! 批次管理模块：请求暂存队列与批次生命周期管理。
//!
//! # Batch Module
//!
//! Staging and bookkeeping for batches.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchQueue`] | Bounded queue ordered by `(-priority, arrival)` or FIFO |
//! | [`QueueConfig`] | Capacity and ordering of a queue |
//! | [`LifecycleManager`] | Owns batch state records and the archived history |
//!
//! ## Lifecycle
//!
//! ```text
//! created -> scheduled -> processing -> completed | failed | cancelled -> archived
//! ```
//!
//! Transitions never move backwards. Cancellation is terminal and allowed from
//! any live state. Archived batches go into a bounded history where the oldest
//! entry is evicted first.
//!
//! ## Example
//!
//! ```rust
//! use batch_engine::batch::{BatchQueue, QueueConfig};
//!
//! let queue = BatchQueue::new(QueueConfig::new().with_capacity(100));
//! queue.enqueue("standings", 1).unwrap();
//! queue.enqueue("live-scores", 9).unwrap();
//! assert_eq!(queue.dequeue().unwrap().data, "live-scores");
//! ```

mod lifecycle;
mod queue;

pub use lifecycle::LifecycleManager;
pub use queue::{BatchQueue, QueueConfig, QueueItem};
