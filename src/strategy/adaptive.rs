//! Adaptive strategy: load-driven concurrency over three sub-batches.

use super::parallel::run_bounded;
use super::{ExecutionStrategy, RunContext, StrategyConfig};
use crate::config::StrategyKind;
use crate::executor::RequestExecutor;
use crate::sampler::{LoadSample, ResourceSampler};
use crate::types::{Outcome, OutcomeStatus, Request};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SUB_BATCHES: usize = 3;

/// Map sampled load to a concurrency tier, bounded by the request count.
///
/// CPU or memory at or above 80% gives 3, at or above 60% gives 5,
/// anything lower gives 10. The result is never below 1.
pub fn select_concurrency(load: &LoadSample, requests: usize) -> usize {
    let peak = load.peak();
    let tier = if peak >= 80.0 {
        3
    } else if peak >= 60.0 {
        5
    } else {
        10
    };
    tier.min(requests).max(1)
}

/// One adaptive execution, as recorded in the rolling history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRecord {
    pub timestamp: DateTime<Utc>,
    pub total_requests: usize,
    /// Seconds.
    pub execution_time: f64,
    /// Requests per second.
    pub throughput: f64,
    pub concurrency_used: usize,
    pub success_rate: f64,
}

/// Bounded history of adaptive runs; the oldest entry is evicted first.
///
/// Diagnostic only. Tier selection does not read it.
#[derive(Debug)]
pub struct AdaptiveHistory {
    entries: Mutex<VecDeque<AdaptiveRecord>>,
    capacity: usize,
}

impl AdaptiveHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, record: AdaptiveRecord) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(record);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<AdaptiveRecord> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Samples the host once, picks a tier, then runs the requests as three
/// sequential sub-batches with bounded-parallel semantics.
///
/// The tier is not capped by `max_concurrency`; only `continue_on_error`
/// and `timeout` are taken from the config.
pub struct Adaptive {
    executor: Arc<dyn RequestExecutor>,
    sampler: Arc<dyn ResourceSampler>,
    config: StrategyConfig,
    pause: Duration,
    history: Arc<AdaptiveHistory>,
}

impl Adaptive {
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        sampler: Arc<dyn ResourceSampler>,
        config: StrategyConfig,
    ) -> Self {
        Self {
            executor,
            sampler,
            config,
            pause: Duration::from_millis(500),
            history: Arc::new(AdaptiveHistory::new(100)),
        }
    }

    /// Pause inserted between sub-batches.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Share a history with other adaptive runs (the engine keeps one).
    pub fn with_history(mut self, history: Arc<AdaptiveHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &AdaptiveHistory {
        &self.history
    }
}

#[async_trait]
impl ExecutionStrategy for Adaptive {
    fn configure(&mut self, config: StrategyConfig) {
        self.config = config;
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    async fn execute(&self, requests: Vec<Request>, run: &RunContext) -> Vec<Outcome> {
        let total = requests.len();
        let load = self.sampler.sample().await;
        let concurrency = select_concurrency(&load, total);
        info!(
            batch_id = %run.batch_id,
            cpu = load.cpu_percent,
            memory = load.memory_percent,
            concurrency,
            "adaptive concurrency selected"
        );

        let started = Instant::now();
        let chunk = total.div_ceil(SUB_BATCHES).max(1);
        let halt = CancellationToken::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = requests.into_iter().peekable();
        let mut index = 0;

        while pending.peek().is_some() {
            if halt.is_cancelled() {
                debug!(batch_id = %run.batch_id, "skipping remaining sub-batches");
                break;
            }
            if index > 0 && !self.pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.pause) => {}
                    _ = run.cancel.cancelled() => {}
                }
            }
            let sub_batch: Vec<Request> = pending.by_ref().take(chunk).collect();
            debug!(
                batch_id = %run.batch_id,
                sub_batch = index,
                size = sub_batch.len(),
                "running sub-batch"
            );
            outcomes.extend(
                run_bounded(
                    &self.executor,
                    sub_batch,
                    concurrency,
                    self.config.timeout,
                    self.config.continue_on_error,
                    run,
                    &halt,
                )
                .await,
            );
            index += 1;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let completed = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Completed)
            .count();
        self.history.record(AdaptiveRecord {
            timestamp: Utc::now(),
            total_requests: total,
            execution_time: elapsed,
            throughput: if elapsed > 0.0 {
                outcomes.len() as f64 / elapsed
            } else {
                0.0
            },
            concurrency_used: concurrency,
            success_rate: if outcomes.is_empty() {
                0.0
            } else {
                completed as f64 / outcomes.len() as f64
            },
        });
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::sampler::StaticSampler;
    use std::collections::HashSet;

    fn adaptive(exec: Arc<ScriptedExecutor>, cpu: f64, mem: f64) -> Adaptive {
        Adaptive::new(
            exec,
            Arc::new(StaticSampler::new(cpu, mem)),
            StrategyConfig::default(),
        )
        .with_pause(Duration::ZERO)
    }

    #[test]
    fn test_tier_boundaries() {
        let n = 20;
        assert_eq!(select_concurrency(&LoadSample::new(10.0, 10.0), n), 10);
        assert_eq!(select_concurrency(&LoadSample::new(60.0, 10.0), n), 5);
        assert_eq!(select_concurrency(&LoadSample::new(10.0, 79.9), n), 5);
        assert_eq!(select_concurrency(&LoadSample::new(80.0, 0.0), n), 3);
        assert_eq!(select_concurrency(&LoadSample::new(0.0, 95.0), n), 3);
    }

    #[test]
    fn test_tier_bounded_by_request_count() {
        assert_eq!(select_concurrency(&LoadSample::new(0.0, 0.0), 4), 4);
        assert_eq!(select_concurrency(&LoadSample::new(90.0, 0.0), 2), 2);
        assert_eq!(select_concurrency(&LoadSample::new(0.0, 0.0), 0), 1);
    }

    #[test]
    fn test_tier_monotonic_in_load() {
        for n in [10, 15, 100] {
            let mut last = usize::MAX;
            for step in 0..=100 {
                let load = step as f64;
                let c = select_concurrency(&LoadSample::new(load, load / 2.0), n);
                assert!(c <= last, "concurrency rose at load {}", load);
                last = c;
            }
        }
    }

    #[tokio::test]
    async fn test_runs_all_requests_and_records_history() {
        let exec = Arc::new(
            ScriptedExecutor::new(Script::Ok(Duration::from_millis(5)))
                .with("r4", Script::Fail),
        );
        let strategy = adaptive(exec.clone(), 85.0, 20.0);
        let outs = strategy.execute(requests(10), &RunContext::new("b")).await;
        assert_eq!(outs.len(), 10);
        let ids: HashSet<_> = outs.iter().map(|o| o.request_id.as_str()).collect();
        assert_eq!(ids.len(), 10);
        assert!(exec.peak() <= 3);

        let history = strategy.history().snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_requests, 10);
        assert_eq!(history[0].concurrency_used, 3);
        assert!((history[0].success_rate - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_single_request_gets_floor_concurrency() {
        let exec = Arc::new(ScriptedExecutor::new(Script::Ok(Duration::ZERO)));
        let strategy = adaptive(exec.clone(), 0.0, 0.0);
        let outs = strategy.execute(requests(1), &RunContext::new("b")).await;
        assert_eq!(outs.len(), 1);
        assert_eq!(strategy.history().snapshot()[0].concurrency_used, 1);
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_later_sub_batches() {
        let exec = Arc::new(
            ScriptedExecutor::new(Script::Ok(Duration::ZERO)).with("r1", Script::Fail),
        );
        let strategy = Adaptive::new(
            exec.clone(),
            Arc::new(StaticSampler::new(0.0, 0.0)),
            StrategyConfig {
                continue_on_error: false,
                ..Default::default()
            },
        )
        .with_pause(Duration::ZERO);
        let outs = strategy.execute(requests(9), &RunContext::new("b")).await;
        // first sub-batch (r1..r3) was admitted together; nothing after it
        assert!(outs.len() <= 3);
        assert!(exec.calls().iter().all(|id| ["r1", "r2", "r3"].contains(&id.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_sub_batches() {
        let exec = Arc::new(ScriptedExecutor::new(Script::Ok(Duration::ZERO)));
        let strategy = adaptive(exec, 0.0, 0.0).with_pause(Duration::from_secs(2));
        let before = tokio::time::Instant::now();
        strategy.execute(requests(6), &RunContext::new("b")).await;
        // two pauses for three sub-batches
        assert!(before.elapsed() >= Duration::from_secs(4));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let history = AdaptiveHistory::new(2);
        for n in 1..=3 {
            history.record(AdaptiveRecord {
                timestamp: Utc::now(),
                total_requests: n,
                execution_time: 0.0,
                throughput: 0.0,
                concurrency_used: 1,
                success_rate: 1.0,
            });
        }
        let totals: Vec<_> = history.snapshot().iter().map(|r| r.total_requests).collect();
        assert_eq!(totals, vec![2, 3]);
    }
}
