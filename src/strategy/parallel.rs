//! Bounded-parallel strategy.

use super::{run_one, ExecutionStrategy, RunContext, StrategyConfig};
use crate::config::StrategyKind;
use crate::executor::RequestExecutor;
use crate::types::{Outcome, Request};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Dispatches every request at once, admitting at most `max_concurrency`
/// executions at a time.
pub struct BoundedParallel {
    executor: Arc<dyn RequestExecutor>,
    config: StrategyConfig,
}

impl BoundedParallel {
    pub fn new(executor: Arc<dyn RequestExecutor>, config: StrategyConfig) -> Self {
        Self { executor, config }
    }
}

#[async_trait]
impl ExecutionStrategy for BoundedParallel {
    fn configure(&mut self, config: StrategyConfig) {
        self.config = config;
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    async fn execute(&self, requests: Vec<Request>, run: &RunContext) -> Vec<Outcome> {
        let halt = CancellationToken::new();
        run_bounded(
            &self.executor,
            requests,
            self.config.max_concurrency,
            self.config.timeout,
            self.config.continue_on_error,
            run,
            &halt,
        )
        .await
    }
}

/// Run `requests` behind a counting gate of `limit` permits.
///
/// `halt` is fired on the first failure when `continue_on_error` is off;
/// requests admitted after that are skipped and left out of the result.
pub(crate) async fn run_bounded(
    executor: &Arc<dyn RequestExecutor>,
    requests: Vec<Request>,
    limit: usize,
    timeout: Duration,
    continue_on_error: bool,
    run: &RunContext,
    halt: &CancellationToken,
) -> Vec<Outcome> {
    let gate = Arc::new(Semaphore::new(limit.max(1)));
    let units = requests.into_iter().map(|request| {
        let gate = gate.clone();
        let executor = executor.clone();
        async move {
            let _permit = match gate.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    return Some(Outcome::failed(
                        request.id,
                        Utc::now(),
                        "admission gate closed",
                    ))
                }
            };
            if halt.is_cancelled() {
                return None;
            }
            let outcome = run_one(executor, request, timeout, run).await;
            if outcome.status.is_error() && !continue_on_error && !halt.is_cancelled() {
                info!(
                    batch_id = %run.batch_id,
                    request_id = %outcome.request_id,
                    "halting dispatch after failure (continue_on_error disabled)"
                );
                halt.cancel();
            }
            Some(outcome)
        }
    });
    futures::future::join_all(units)
        .await
        .into_iter()
        .flatten()
        .collect()
}
