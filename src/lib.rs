//! # batch-engine
//!
//! 批量采集请求的执行与结果合并引擎：按所选并发策略运行一批彼此独立的慢请求，
//! 跟踪批次生命周期，并把各请求结果合并为带质量评分的批次结果。
//!
//! In-process batch execution and result-consolidation engine. It accepts a
//! collection of independent, potentially slow collection requests, runs them
//! under a selectable concurrency strategy, tracks the batch lifecycle, and
//! consolidates per-request outcomes into a single quality-scored result.
//!
//! ## Core Ideas
//!
//! - **Outcomes, not exceptions**: executor errors, panics and timeouts become
//!   [`Outcome`] values with a status; `Err` is reserved for submission-time
//!   validation and infrastructure faults
//! - **Closed strategy set**: [`StrategyKind`] resolves to one of three
//!   [`strategy`] variants through a factory
//! - **Explicit context**: a [`BatchEngine`] owns every piece of shared state;
//!   there are no globals
//! - **Cooperative cancellation**: every request gets a child
//!   `CancellationToken`; work is never force-killed
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_engine::executor::{ExecutionContext, FnExecutor};
//! use batch_engine::{BatchEngine, EngineConfig, Outcome, Request};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> batch_engine::Result<()> {
//!     batch_engine::logging::init_tracing();
//!
//!     let executor = Arc::new(FnExecutor::new(|req: Request, _ctx: ExecutionContext| async move {
//!         // fetch and store data for `req.payload` here
//!         Ok(Outcome::completed(req.id, chrono::Utc::now()).with_records(12))
//!     }));
//!     let engine = BatchEngine::new(EngineConfig::default().with_env_overrides()?, executor)?;
//!
//!     let requests = (1..=20)
//!         .map(|i| Request::new(format!("fixture-{}", i), serde_json::json!({ "round": i })))
//!         .collect();
//!     let result = engine.run_default(requests).await?;
//!     println!("success rate {:.2}", result.success_rate);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Requests, outcomes, batch state |
//! | [`config`] | Engine and per-batch options, YAML and env loading |
//! | [`executor`] | Single-request executor contract |
//! | [`sampler`] | Host load sampling for the adaptive strategy |
//! | [`batch`] | Priority queue and lifecycle manager |
//! | [`strategy`] | Sequential, bounded-parallel and adaptive execution |
//! | [`aggregate`] | Statistics, record consolidation, quality scoring |
//! | [`cache`] | Outcome cache for repeated payloads |
//! | [`engine`] | The [`BatchEngine`] entry point |
//! | [`logging`] | Tracing subscriber setup |

pub mod aggregate;
pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod executor;
pub mod logging;
pub mod sampler;
pub mod strategy;
pub mod types;

// Re-export main types for convenience
pub use aggregate::{BatchResult, ConsolidationResult, ConsolidationStrategy, QualityReport};
pub use config::{BatchOptions, EngineConfig, QualityThresholds, StrategyKind};
pub use engine::{BatchEngine, BatchEngineBuilder};
pub use executor::{ExecutionContext, RequestExecutor};
pub use types::{BatchState, BatchStatus, Outcome, OutcomeStatus, Record, Request};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, QueueError};
