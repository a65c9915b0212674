use super::{BatchEngine, EngineInner, Registry};
use crate::aggregate::{AggregatorConfig, ResultAggregator};
use crate::batch::LifecycleManager;
use crate::cache::OutcomeCache;
use crate::config::EngineConfig;
use crate::executor::RequestExecutor;
use crate::sampler::{ResourceSampler, StaticSampler};
use crate::strategy::AdaptiveHistory;
use crate::Result;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Builder for [`BatchEngine`].
///
/// Only the executor is required. Without a sampler the engine reports zero
/// load, so adaptive batches run at the top concurrency tier.
pub struct BatchEngineBuilder {
    executor: Arc<dyn RequestExecutor>,
    config: EngineConfig,
    sampler: Option<Arc<dyn ResourceSampler>>,
}

impl BatchEngineBuilder {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            config: EngineConfig::default(),
            sampler: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sampler consulted by adaptive batches.
    pub fn sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Use host CPU and memory readings for adaptive batches.
    #[cfg(feature = "system-metrics")]
    pub fn system_sampler(self) -> Self {
        self.sampler(Arc::new(crate::sampler::SystemSampler::new()))
    }

    pub fn build(self) -> Result<BatchEngine> {
        self.config.validate()?;
        let config = self.config;
        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(StaticSampler::default()));
        debug!(
            executor = self.executor.name(),
            queue_capacity = config.queue_capacity,
            history_capacity = config.history_capacity,
            "batch engine built"
        );
        Ok(BatchEngine {
            inner: Arc::new(EngineInner {
                lifecycle: LifecycleManager::new(config.history_capacity),
                cache: Arc::new(OutcomeCache::new(config.cache_capacity, config.cache_ttl)),
                adaptive_history: Arc::new(AdaptiveHistory::new(config.adaptive_history_capacity)),
                aggregator: ResultAggregator::new(AggregatorConfig::from(&config)),
                registry: Mutex::new(Registry::default()),
                executor: self.executor,
                sampler,
                config,
            }),
        })
    }
}
