//! 执行策略模块：顺序、有界并行与自适应三种并发策略。
//!
//! # Execution Strategy Module
//!
//! Turns a list of requests into a list of outcomes under a concurrency policy.
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | [`Sequential`] | One request at a time, output order equals input order |
//! | [`BoundedParallel`] | All requests dispatched, at most `max_concurrency` in flight |
//! | [`Adaptive`] | Samples host load, picks a concurrency tier, runs three sub-batches |
//!
//! Every strategy applies the per-request timeout the same way: the executor
//! call runs in its own task, and when the timeout elapses a synthetic
//! `timeout` outcome is recorded and the request's cancellation token is
//! fired. The task itself is detached, not aborted.
//!
//! With `continue_on_error = false`, no new request is started after the
//! first `failed`/`timeout` outcome. Requests already in flight finish, and
//! requests that never started are left out of the returned list.
//!
//! [`Strategy`] is the closed set of variants, built through [`Strategy::build`].

mod adaptive;
mod parallel;
mod sequential;

pub use adaptive::{select_concurrency, Adaptive, AdaptiveHistory, AdaptiveRecord};
pub use parallel::BoundedParallel;
pub use sequential::Sequential;

use crate::config::{BatchOptions, StrategyKind};
use crate::executor::{ExecutionContext, RequestExecutor};
use crate::sampler::ResourceSampler;
use crate::types::{Outcome, Request};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Knobs shared by all strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub max_concurrency: usize,
    pub continue_on_error: bool,
    pub failure_threshold: f64,
    pub timeout: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            continue_on_error: true,
            failure_threshold: 0.5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&BatchOptions> for StrategyConfig {
    fn from(o: &BatchOptions) -> Self {
        Self {
            max_concurrency: o.max_concurrency,
            continue_on_error: o.continue_on_error,
            failure_threshold: o.failure_threshold,
            timeout: o.timeout_per_request,
        }
    }
}

/// Identity and cancellation scope of one batch execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub batch_id: String,
    /// Batch-level token; every request gets a child of it.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn configure(&mut self, config: StrategyConfig);

    fn config(&self) -> &StrategyConfig;

    fn kind(&self) -> StrategyKind;

    /// Execute the requests. The result holds one outcome per started or
    /// cancelled request; it is shorter than the input only after an early
    /// stop caused by `continue_on_error = false`.
    async fn execute(&self, requests: Vec<Request>, run: &RunContext) -> Vec<Outcome>;
}

/// Settings only the adaptive variant uses.
#[derive(Clone)]
pub struct AdaptiveSettings {
    pub pause: Duration,
    pub history: Arc<AdaptiveHistory>,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            pause: Duration::from_millis(500),
            history: Arc::new(AdaptiveHistory::new(100)),
        }
    }
}

/// Closed set of strategy variants.
pub enum Strategy {
    Sequential(Sequential),
    Parallel(BoundedParallel),
    Adaptive(Adaptive),
}

impl Strategy {
    /// Factory resolving a [`StrategyKind`] to its implementation.
    pub fn build(
        kind: StrategyKind,
        executor: Arc<dyn RequestExecutor>,
        sampler: Arc<dyn ResourceSampler>,
        config: StrategyConfig,
        adaptive: AdaptiveSettings,
    ) -> Self {
        match kind {
            StrategyKind::Sequential => Strategy::Sequential(Sequential::new(executor, config)),
            StrategyKind::Parallel => Strategy::Parallel(BoundedParallel::new(executor, config)),
            StrategyKind::Adaptive => Strategy::Adaptive(
                Adaptive::new(executor, sampler, config)
                    .with_pause(adaptive.pause)
                    .with_history(adaptive.history),
            ),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for Strategy {
    fn configure(&mut self, config: StrategyConfig) {
        match self {
            Strategy::Sequential(s) => s.configure(config),
            Strategy::Parallel(s) => s.configure(config),
            Strategy::Adaptive(s) => s.configure(config),
        }
    }

    fn config(&self) -> &StrategyConfig {
        match self {
            Strategy::Sequential(s) => s.config(),
            Strategy::Parallel(s) => s.config(),
            Strategy::Adaptive(s) => s.config(),
        }
    }

    fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Sequential(_) => StrategyKind::Sequential,
            Strategy::Parallel(_) => StrategyKind::Parallel,
            Strategy::Adaptive(_) => StrategyKind::Adaptive,
        }
    }

    async fn execute(&self, requests: Vec<Request>, run: &RunContext) -> Vec<Outcome> {
        match self {
            Strategy::Sequential(s) => s.execute(requests, run).await,
            Strategy::Parallel(s) => s.execute(requests, run).await,
            Strategy::Adaptive(s) => s.execute(requests, run).await,
        }
    }
}

/// Execute one request under the per-request timeout.
///
/// Never fails: executor errors, panics and overruns all become outcomes.
pub(crate) async fn run_one(
    executor: Arc<dyn RequestExecutor>,
    request: Request,
    timeout: Duration,
    run: &RunContext,
) -> Outcome {
    if run.cancel.is_cancelled() {
        return Outcome::cancelled(request.id, "batch cancelled before the request started");
    }

    let request_id = request.id.clone();
    let token = run.cancel.child_token();
    let ctx = ExecutionContext::new(run.batch_id.clone(), timeout).with_cancel(token.clone());
    let started = Utc::now();

    debug!(batch_id = %run.batch_id, request_id = %request_id, "dispatching request");
    let handle = tokio::spawn(async move { executor.execute(&request, &ctx).await });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(outcome))) if outcome.status.is_terminal() => outcome,
        Ok(Ok(Ok(outcome))) => Outcome::failed(
            request_id,
            started,
            format!("executor returned non-terminal status '{}'", outcome.status),
        ),
        Ok(Ok(Err(e))) => Outcome::failed(request_id, started, e.to_string()),
        Ok(Err(join_err)) => Outcome::failed(
            request_id,
            started,
            format!("executor task failed: {}", join_err),
        ),
        Err(_) => {
            // The detached task keeps running; the token lets it notice.
            token.cancel();
            warn!(
                batch_id = %run.batch_id,
                request_id = %request_id,
                timeout_ms = timeout.as_millis() as u64,
                "request timed out"
            );
            Outcome::timeout(request_id, started, timeout)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::sampler::StaticSampler;
    use crate::types::OutcomeStatus;

    #[tokio::test]
    async fn test_run_one_converts_error_to_failed() {
        let exec: Arc<dyn RequestExecutor> =
            Arc::new(ScriptedExecutor::new(Script::Error));
        let out = run_one(
            exec,
            Request::new("a", serde_json::json!({})),
            Duration::from_secs(1),
            &RunContext::new("b"),
        )
        .await;
        assert_eq!(out.status, OutcomeStatus::Failed);
        assert!(out.error.unwrap().contains("scraper crashed"));
    }

    #[tokio::test]
    async fn test_run_one_converts_panic_to_failed() {
        let exec: Arc<dyn RequestExecutor> =
            Arc::new(ScriptedExecutor::new(Script::Panic));
        let out = run_one(
            exec,
            Request::new("a", serde_json::json!({})),
            Duration::from_secs(1),
            &RunContext::new("b"),
        )
        .await;
        assert_eq!(out.status, OutcomeStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_one_timeout_names_limit() {
        let exec: Arc<dyn RequestExecutor> = Arc::new(ScriptedExecutor::new(Script::Sleep(
            Duration::from_secs(60),
        )));
        let timeout = Duration::from_millis(100);
        let out = run_one(
            exec,
            Request::new("slow", serde_json::json!({})),
            timeout,
            &RunContext::new("b"),
        )
        .await;
        assert_eq!(out.status, OutcomeStatus::Timeout);
        assert!(out.error.unwrap().contains(&format!("{:?}", timeout)));
    }

    #[tokio::test]
    async fn test_run_one_skips_when_batch_cancelled() {
        let exec = Arc::new(ScriptedExecutor::new(Script::Ok(Duration::ZERO)));
        let run = RunContext::new("b");
        run.cancel.cancel();
        let out = run_one(
            exec.clone(),
            Request::new("a", serde_json::json!({})),
            Duration::from_secs(1),
            &run,
        )
        .await;
        assert_eq!(out.status, OutcomeStatus::Cancelled);
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_factory_resolves_kinds() {
        let exec: Arc<dyn RequestExecutor> =
            Arc::new(ScriptedExecutor::new(Script::Ok(Duration::ZERO)));
        let sampler: Arc<dyn ResourceSampler> = Arc::new(StaticSampler::new(0.0, 0.0));
        for kind in [
            StrategyKind::Sequential,
            StrategyKind::Parallel,
            StrategyKind::Adaptive,
        ] {
            let mut strategy = Strategy::build(
                kind,
                exec.clone(),
                sampler.clone(),
                StrategyConfig::default(),
                AdaptiveSettings {
                    pause: Duration::ZERO,
                    ..Default::default()
                },
            );
            assert_eq!(strategy.kind(), kind);
            strategy.configure(StrategyConfig {
                max_concurrency: 2,
                ..Default::default()
            });
            assert_eq!(strategy.config().max_concurrency, 2);
            let outs = strategy.execute(requests(4), &RunContext::new("b")).await;
            assert_eq!(outs.len(), 4);
        }
    }
}
