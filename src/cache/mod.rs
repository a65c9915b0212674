//! 结果缓存模块：对重复请求复用已完成的执行结果。
//!
//! # Outcome Caching Module
//!
//! When a batch runs with `enable_caching`, the engine wraps its executor in a
//! [`CachingExecutor`]. Requests whose payloads hash to the same key reuse the
//! first completed outcome instead of hitting the source again.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`OutcomeCache`] | Mutex-guarded LRU with a fixed TTL and hit statistics |
//! | [`CachingExecutor`] | [`RequestExecutor`](crate::executor::RequestExecutor) decorator |
//! | [`CacheKey`] | SHA-256 of a request payload |
//! | [`CacheKeyGenerator`] | Builds keys, optionally salted |
//!
//! Only `completed` outcomes are stored. Failed, timed-out and cancelled
//! requests always run again.
//!
//! ## Example
//!
//! ```rust
//! use batch_engine::cache::OutcomeCache;
//! use std::time::Duration;
//!
//! let cache = OutcomeCache::new(1000, Duration::from_secs(3600));
//! assert!(cache.is_empty());
//! ```

mod executor;
mod key;
mod store;

pub use executor::CachingExecutor;
pub use key::{content_hash, CacheKey, CacheKeyGenerator};
pub use store::{CacheStats, OutcomeCache};
