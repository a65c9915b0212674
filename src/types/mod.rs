//! 核心数据模型：请求、执行结果与批次状态。
//!
//! # Types Module
//!
//! Shared data model for the batch engine: what goes in (requests), what comes
//! out of a single execution (outcomes) and the per-batch state record owned by
//! the [`LifecycleManager`](crate::batch::LifecycleManager).
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | One collection request with id, priority and opaque payload |
//! | [`Outcome`] | Terminal (or synthetic) result of executing a request |
//! | [`OutcomeStatus`] | `pending`, `processing`, `completed`, `failed`, `timeout`, `cancelled` |
//! | [`ResourceUsage`] | CPU, wall time, memory and network counters for one outcome |
//! | [`BatchState`] | Lifecycle record of a batch |
//! | [`BatchStatus`] | `created` → `scheduled` → `processing` → terminal → `archived` |
//! | [`Record`] | One extracted data record (a JSON object) |

pub mod batch;
pub mod outcome;
pub mod request;

pub use batch::{BatchState, BatchStatus};
pub use outcome::{Outcome, OutcomeStatus, ResourceUsage};
pub use request::Request;

/// One extracted data record.
pub type Record = serde_json::Map<String, serde_json::Value>;
