//! 批处理引擎：提交、查询、取消与结果获取的统一入口。
//!
//! # Batch Engine
//!
//! [`BatchEngine`] is the context object tying the components together. It is
//! constructed once and shared by reference (it is cheap to clone); there is
//! no process-global state.
//!
//! ```text
//! submit ─► validate ─► queue order ─► LifecycleManager.create/schedule
//!                                            │
//!                        background task ◄───┘
//!                              │
//!        Strategy.execute ─► final status ─► ResultAggregator ─► archive
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use batch_engine::{BatchEngine, EngineConfig, Request, StrategyKind};
//! use batch_engine::executor::{ExecutionContext, FnExecutor};
//! use batch_engine::types::Outcome;
//! use std::sync::Arc;
//!
//! # async fn demo() -> batch_engine::Result<()> {
//! let executor = Arc::new(FnExecutor::new(|req: Request, _ctx: ExecutionContext| async move {
//!     Ok(Outcome::completed(req.id, chrono::Utc::now()).with_records(1))
//! }));
//! let engine = BatchEngine::new(EngineConfig::default(), executor)?;
//!
//! let requests = vec![
//!     Request::new("scores", serde_json::json!({"source": "scores"})),
//!     Request::new("weather", serde_json::json!({"source": "weather"})).with_priority(5),
//! ];
//! let options = engine.default_options().with_strategy(StrategyKind::Adaptive);
//! let result = engine.run(requests, options).await?;
//! println!("{} of {} succeeded", result.successful, result.total);
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::BatchEngineBuilder;

use crate::aggregate::{BatchResult, ResultAggregator};
use crate::batch::{BatchQueue, LifecycleManager, QueueConfig};
use crate::cache::{CacheStats, CachingExecutor, OutcomeCache};
use crate::config::{BatchOptions, EngineConfig};
use crate::executor::RequestExecutor;
use crate::sampler::ResourceSampler;
use crate::strategy::{
    AdaptiveHistory, AdaptiveRecord, AdaptiveSettings, ExecutionStrategy, RunContext, Strategy,
    StrategyConfig,
};
use crate::types::{BatchState, BatchStatus, Outcome, Request};
use crate::{Error, ErrorContext, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Live batch: its cancellation token and the channel its result arrives on.
struct RunHandle {
    cancel: CancellationToken,
    result: watch::Receiver<Option<Arc<BatchResult>>>,
}

/// Running batches and finished results, bounded like the lifecycle history.
#[derive(Default)]
struct Registry {
    runs: HashMap<String, RunHandle>,
    results: HashMap<String, Arc<BatchResult>>,
    order: VecDeque<String>,
}

impl Registry {
    fn complete(&mut self, batch_id: &str, result: Arc<BatchResult>, capacity: usize) {
        self.runs.remove(batch_id);
        self.results.insert(batch_id.to_string(), result);
        self.order.push_back(batch_id.to_string());
        while self.order.len() > capacity {
            if let Some(old) = self.order.pop_front() {
                self.results.remove(&old);
            }
        }
    }
}

pub(crate) struct EngineInner {
    config: EngineConfig,
    lifecycle: LifecycleManager,
    executor: Arc<dyn RequestExecutor>,
    sampler: Arc<dyn ResourceSampler>,
    cache: Arc<OutcomeCache>,
    adaptive_history: Arc<AdaptiveHistory>,
    aggregator: ResultAggregator,
    registry: Mutex<Registry>,
}

/// Batch execution engine.
#[derive(Clone)]
pub struct BatchEngine {
    inner: Arc<EngineInner>,
}

impl BatchEngine {
    pub fn new(config: EngineConfig, executor: Arc<dyn RequestExecutor>) -> Result<Self> {
        Self::builder(executor).config(config).build()
    }

    pub fn builder(executor: Arc<dyn RequestExecutor>) -> BatchEngineBuilder {
        BatchEngineBuilder::new(executor)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Batch options configured for this engine (the `defaults` block of the
    /// YAML file plus any `BATCH_ENGINE_*` overrides). Start per-batch
    /// options from here rather than from `BatchOptions::default()`.
    pub fn default_options(&self) -> BatchOptions {
        self.inner.config.defaults.clone()
    }

    /// [`submit`](Self::submit) with [`default_options`](Self::default_options).
    pub async fn submit_default(&self, requests: Vec<Request>) -> Result<String> {
        self.submit(requests, self.default_options()).await
    }

    /// [`run`](Self::run) with [`default_options`](Self::default_options).
    pub async fn run_default(&self, requests: Vec<Request>) -> Result<Arc<BatchResult>> {
        self.run(requests, self.default_options()).await
    }

    /// Validate and start a batch. Execution continues in the background;
    /// use [`status`](Self::status), [`result`](Self::result) or
    /// [`wait`](Self::wait) to follow it.
    ///
    /// Fails before anything runs when `requests` is empty, holds a duplicate
    /// id, exceeds the queue capacity, or `options` are invalid.
    pub async fn submit(&self, requests: Vec<Request>, options: BatchOptions) -> Result<String> {
        validate_requests(&requests)?;
        options.validate()?;

        let ordered = order_requests(requests, &options, self.inner.config.queue_capacity)?;
        let lifecycle = &self.inner.lifecycle;
        let batch_id = lifecycle.create(&ordered, options.clone()).await;
        let execution_id = lifecycle.schedule(&batch_id).await?;

        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        self.registry().runs.insert(
            batch_id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                result: rx,
            },
        );
        info!(
            batch_id = %batch_id,
            execution_id = %execution_id,
            strategy = %options.strategy,
            requests = ordered.len(),
            "batch submitted"
        );

        let inner = self.inner.clone();
        let id = batch_id.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.run_batch(&id, ordered, options, cancel, tx).await {
                error!(batch_id = %id, error = %e, "batch execution aborted");
                // dropping the sender wakes waiters with an error
                inner.registry().runs.remove(&id);
            }
        });
        Ok(batch_id)
    }

    /// Copy of the batch state, live or archived.
    pub async fn status(&self, batch_id: &str) -> Option<BatchState> {
        self.inner.lifecycle.get_status(batch_id).await
    }

    /// Cancel a batch that has not reached a terminal state.
    ///
    /// Requests not yet started are recorded as `cancelled`; requests in
    /// flight see their cancellation token fire and are left to finish.
    pub async fn cancel(&self, batch_id: &str) -> bool {
        if !self.inner.lifecycle.cancel(batch_id).await {
            return false;
        }
        if let Some(handle) = self.registry().runs.get(batch_id) {
            handle.cancel.cancel();
        }
        true
    }

    /// The batch result, once the batch is terminal.
    pub fn result(&self, batch_id: &str) -> Option<Arc<BatchResult>> {
        self.registry().results.get(batch_id).cloned()
    }

    /// Resolve when the batch result is available.
    pub async fn wait(&self, batch_id: &str) -> Result<Arc<BatchResult>> {
        let mut rx = {
            let registry = self.registry();
            if let Some(done) = registry.results.get(batch_id) {
                return Ok(done.clone());
            }
            match registry.runs.get(batch_id) {
                Some(handle) => handle.result.clone(),
                None => return Err(Error::not_found(batch_id)),
            }
        };
        let received = rx.wait_for(|r| r.is_some()).await.map(|r| (*r).clone());
        match received {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(Error::not_found(batch_id)),
            Err(_) => Err(Error::BatchExecution {
                batch_id: batch_id.to_string(),
                execution_id: self
                    .status(batch_id)
                    .await
                    .and_then(|s| s.execution_id)
                    .unwrap_or_default(),
                message: "batch task ended without producing a result".to_string(),
            }),
        }
    }

    /// Submit and wait. An early stop caused by `continue_on_error = false`
    /// is returned as [`Error::EarlyTermination`] carrying the partial result.
    pub async fn run(&self, requests: Vec<Request>, options: BatchOptions) -> Result<Arc<BatchResult>> {
        let batch_id = self.submit(requests, options).await?;
        let result = self.wait(&batch_id).await?;
        if result.stopped_early() {
            let request_id = result
                .first_error()
                .map(|e| e.request_id.clone())
                .unwrap_or_default();
            return Err(Error::EarlyTermination {
                batch_id,
                request_id,
                partial: Box::new(result.as_ref().clone()),
            });
        }
        Ok(result)
    }

    /// Adaptive runs recorded so far, oldest first.
    pub fn adaptive_history(&self) -> Vec<AdaptiveRecord> {
        self.inner.adaptive_history.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub async fn active_batches(&self) -> usize {
        self.inner.lifecycle.active_count().await
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.registry()
    }
}

impl EngineInner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_batch(
        &self,
        batch_id: &str,
        requests: Vec<Request>,
        options: BatchOptions,
        cancel: CancellationToken,
        tx: watch::Sender<Option<Arc<BatchResult>>>,
    ) -> Result<()> {
        let requested = requests.len();
        let outcomes = if self.lifecycle.start(batch_id).await? {
            let executor: Arc<dyn RequestExecutor> = if options.enable_caching {
                Arc::new(CachingExecutor::new(self.executor.clone(), self.cache.clone()))
            } else {
                self.executor.clone()
            };
            let strategy = Strategy::build(
                options.strategy,
                executor,
                self.sampler.clone(),
                StrategyConfig::from(&options),
                AdaptiveSettings {
                    pause: self.config.adaptive_pause,
                    history: self.adaptive_history.clone(),
                },
            );
            info!(batch_id = %batch_id, strategy = %strategy.kind(), "batch processing");
            let run = RunContext::new(batch_id).with_cancel(cancel.clone());
            strategy.execute(requests, &run).await
        } else {
            requests
                .into_iter()
                .map(|r| Outcome::cancelled(r.id, "batch cancelled before execution started"))
                .collect()
        };

        let (status, message) = if cancel.is_cancelled() {
            (BatchStatus::Cancelled, Some("batch cancelled".to_string()))
        } else {
            final_status(&outcomes, requested, options.failure_threshold)
        };
        if let Some(ref m) = message {
            warn!(batch_id = %batch_id, "{}", m);
        }
        let status = self
            .lifecycle
            .finish(batch_id, outcomes, status, message)
            .await?;

        let state = self
            .lifecycle
            .get_status(batch_id)
            .await
            .ok_or_else(|| Error::not_found(batch_id))?;
        let result = Arc::new(self.aggregator.aggregate(&state, None));
        self.lifecycle.archive(batch_id).await?;

        info!(
            batch_id = %batch_id,
            status = %status,
            successful = result.successful,
            total = result.total,
            success_rate = result.success_rate,
            duration_s = result.total_duration,
            "batch result ready"
        );
        self.registry()
            .complete(batch_id, result.clone(), self.config.history_capacity);
        tx.send_replace(Some(result));
        Ok(())
    }
}

/// Terminal status for a batch that was not cancelled, plus an error note.
///
/// An early stop always fails the batch. Otherwise it fails when the share of
/// non-completed requests exceeds `failure_threshold`.
pub fn final_status(
    outcomes: &[Outcome],
    requested: usize,
    failure_threshold: f64,
) -> (BatchStatus, Option<String>) {
    if outcomes.len() < requested {
        let culprit = outcomes
            .iter()
            .find(|o| o.status.is_error())
            .map(|o| o.request_id.as_str())
            .unwrap_or("unknown");
        return (
            BatchStatus::Failed,
            Some(format!(
                "stopped after request '{}' failed; {} of {} requests ran",
                culprit,
                outcomes.len(),
                requested
            )),
        );
    }
    if requested == 0 {
        return (BatchStatus::Completed, None);
    }
    let unsuccessful = outcomes.iter().filter(|o| !o.is_success()).count();
    let share = unsuccessful as f64 / requested as f64;
    if share > failure_threshold {
        (
            BatchStatus::Failed,
            Some(format!(
                "{} of {} requests did not complete ({:.0}% > {:.0}% threshold)",
                unsuccessful,
                requested,
                share * 100.0,
                failure_threshold * 100.0
            )),
        )
    } else {
        (BatchStatus::Completed, None)
    }
}

fn validate_requests(requests: &[Request]) -> Result<()> {
    if requests.is_empty() {
        return Err(Error::validation_with_context(
            "batch must contain at least one request",
            ErrorContext::new().with_field_path("requests"),
        ));
    }
    let mut seen = HashSet::with_capacity(requests.len());
    for (i, r) in requests.iter().enumerate() {
        if !seen.insert(r.id.as_str()) {
            return Err(Error::validation_with_context(
                format!("duplicate request id '{}'", r.id),
                ErrorContext::new().with_field_path(format!("requests[{}].id", i)),
            ));
        }
    }
    Ok(())
}

/// Pass requests through a [`BatchQueue`] to get execution order.
fn order_requests(requests: Vec<Request>, options: &BatchOptions, capacity: usize) -> Result<Vec<Request>> {
    let queue = BatchQueue::new(
        QueueConfig::new()
            .with_capacity(capacity)
            .with_priority_ordering(options.priority_ordering),
    );
    for request in requests {
        let priority = request.priority;
        queue.enqueue(request, priority)?;
    }
    Ok(queue.drain())
}
