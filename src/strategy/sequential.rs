//! Sequential strategy.

use super::{run_one, ExecutionStrategy, RunContext, StrategyConfig};
use crate::config::StrategyKind;
use crate::executor::RequestExecutor;
use crate::types::{Outcome, Request};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Runs requests one at a time in the given order.
pub struct Sequential {
    executor: Arc<dyn RequestExecutor>,
    config: StrategyConfig,
}

impl Sequential {
    pub fn new(executor: Arc<dyn RequestExecutor>, config: StrategyConfig) -> Self {
        Self { executor, config }
    }
}

#[async_trait]
impl ExecutionStrategy for Sequential {
    fn configure(&mut self, config: StrategyConfig) {
        self.config = config;
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(&self, requests: Vec<Request>, run: &RunContext) -> Vec<Outcome> {
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        for request in requests {
            let outcome = run_one(self.executor.clone(), request, self.config.timeout, run).await;
            let stop = outcome.status.is_error() && !self.config.continue_on_error;
            outcomes.push(outcome);
            if stop {
                info!(
                    batch_id = %run.batch_id,
                    executed = outcomes.len(),
                    total,
                    "stopping after failure (continue_on_error disabled)"
                );
                break;
            }
        }
        outcomes
    }
}
