//! 引擎配置：批次选项、质量阈值与环境变量覆盖。
//!
//! Engine configuration.
//!
//! [`EngineConfig`] can be built in code with `with_*` setters, loaded from
//! YAML, and adjusted from environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BATCH_ENGINE_MAX_CONCURRENCY` | `defaults.max_concurrency` |
//! | `BATCH_ENGINE_TIMEOUT_MS` | `defaults.timeout_per_request` |
//! | `BATCH_ENGINE_QUEUE_CAPACITY` | `queue_capacity` |

use crate::aggregate::ConsolidationStrategy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Serialize `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Concurrency policy used to run a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    Parallel,
    Adaptive,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Parallel
    }
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" | "bounded_parallel" | "bounded-parallel" => Ok(Self::Parallel),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(Error::validation_with_context(
                format!("unknown strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("strategy")
                    .with_details("expected one of: sequential, parallel, adaptive"),
            )),
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub strategy: StrategyKind,
    pub max_concurrency: usize,
    #[serde(with = "duration_ms")]
    pub timeout_per_request: Duration,
    pub continue_on_error: bool,
    /// Fraction of non-successful outcomes above which the batch ends `failed`.
    pub failure_threshold: f64,
    pub priority_ordering: bool,
    pub enable_caching: bool,
    pub consolidation: ConsolidationStrategy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_concurrency: 10,
            timeout_per_request: Duration::from_secs(30),
            continue_on_error: true,
            failure_threshold: 0.5,
            priority_ordering: true,
            enable_caching: false,
            consolidation: ConsolidationStrategy::default(),
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_strategy(mut self, s: StrategyKind) -> Self {
        self.strategy = s;
        self
    }
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }
    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.timeout_per_request = t;
        self
    }
    pub fn with_continue_on_error(mut self, c: bool) -> Self {
        self.continue_on_error = c;
        self
    }
    pub fn with_failure_threshold(mut self, f: f64) -> Self {
        self.failure_threshold = f;
        self
    }
    pub fn with_priority_ordering(mut self, p: bool) -> Self {
        self.priority_ordering = p;
        self
    }
    pub fn with_caching(mut self, c: bool) -> Self {
        self.enable_caching = c;
        self
    }
    pub fn with_consolidation(mut self, c: ConsolidationStrategy) -> Self {
        self.consolidation = c;
        self
    }

    /// Reject option values the strategies cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::validation_with_context(
                "max_concurrency must be at least 1",
                ErrorContext::new().with_field_path("options.max_concurrency"),
            ));
        }
        if self.timeout_per_request.is_zero() {
            return Err(Error::validation_with_context(
                "timeout_per_request must be positive",
                ErrorContext::new().with_field_path("options.timeout_per_request"),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(Error::validation_with_context(
                "failure_threshold must be within [0, 1]",
                ErrorContext::new()
                    .with_field_path("options.failure_threshold")
                    .with_details(self.failure_threshold.to_string()),
            ));
        }
        Ok(())
    }
}

/// Minimum acceptable score per quality dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            completeness: 0.9,
            accuracy: 0.95,
            consistency: 0.8,
            timeliness: 0.7,
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Options applied when a submission does not override them
    pub defaults: BatchOptions,
    pub queue_capacity: usize,
    /// Archived batches kept before the oldest is evicted
    pub history_capacity: usize,
    /// Pause between adaptive sub-batches
    #[serde(with = "duration_ms")]
    pub adaptive_pause: Duration,
    pub adaptive_history_capacity: usize,
    pub cache_capacity: usize,
    #[serde(with = "duration_ms")]
    pub cache_ttl: Duration,
    pub quality_thresholds: QualityThresholds,
    /// Field used to identify records during consolidation
    pub key_field: String,
    /// Drop empty fields and coerce numeric strings after consolidation
    pub improve_quality: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: BatchOptions::default(),
            queue_capacity: 10_000,
            history_capacity: 1000,
            adaptive_pause: Duration::from_millis(500),
            adaptive_history_capacity: 100,
            cache_capacity: 1000,
            cache_ttl: Duration::from_secs(3600),
            quality_thresholds: QualityThresholds::default(),
            key_field: "id".to_string(),
            improve_quality: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `BATCH_ENGINE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_number("BATCH_ENGINE_MAX_CONCURRENCY")? {
            self.defaults.max_concurrency = v as usize;
        }
        if let Some(v) = env_number("BATCH_ENGINE_TIMEOUT_MS")? {
            self.defaults.timeout_per_request = Duration::from_millis(v);
        }
        if let Some(v) = env_number("BATCH_ENGINE_QUEUE_CAPACITY")? {
            self.queue_capacity = v as usize;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        if self.queue_capacity == 0 || self.history_capacity == 0 {
            return Err(Error::configuration_with_context(
                "queue_capacity and history_capacity must be positive",
                ErrorContext::new().with_source("config"),
            ));
        }
        if self.key_field.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "key_field must not be empty",
                ErrorContext::new().with_field_path("key_field"),
            ));
        }
        Ok(())
    }

    pub fn with_defaults(mut self, defaults: BatchOptions) -> Self {
        self.defaults = defaults;
        self
    }
    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }
    pub fn with_history_capacity(mut self, n: usize) -> Self {
        self.history_capacity = n;
        self
    }
    pub fn with_adaptive_pause(mut self, d: Duration) -> Self {
        self.adaptive_pause = d;
        self
    }
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }
    pub fn with_quality_thresholds(mut self, t: QualityThresholds) -> Self {
        self.quality_thresholds = t;
        self
    }
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }
    pub fn with_improve_quality(mut self, enabled: bool) -> Self {
        self.improve_quality = enabled;
        self
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("{} must be a non-negative integer", name),
                ErrorContext::new()
                    .with_details(raw)
                    .with_source("env"),
            )
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.defaults.max_concurrency, 10);
        assert_eq!(cfg.history_capacity, 1000);
        assert_eq!(cfg.adaptive_history_capacity, 100);
        assert!(cfg.defaults.continue_on_error);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
queue_capacity: 50
adaptive_pause: 20
defaults:
  strategy: adaptive
  timeout_per_request: 1500
  continue_on_error: false
  consolidation: priority
"#;
        let cfg = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.queue_capacity, 50);
        assert_eq!(cfg.adaptive_pause, Duration::from_millis(20));
        assert_eq!(cfg.defaults.strategy, StrategyKind::Adaptive);
        assert_eq!(cfg.defaults.timeout_per_request, Duration::from_millis(1500));
        assert!(!cfg.defaults.continue_on_error);
        assert_eq!(cfg.defaults.consolidation, ConsolidationStrategy::Priority);
        // untouched fields keep defaults
        assert_eq!(cfg.defaults.max_concurrency, 10);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let opts = BatchOptions::new().with_max_concurrency(0);
        assert!(opts.validate().unwrap_err().is_validation());
        let opts = BatchOptions::new().with_failure_threshold(1.5);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Sequential".parse::<StrategyKind>().unwrap(), StrategyKind::Sequential);
        assert_eq!("parallel".parse::<StrategyKind>().unwrap(), StrategyKind::Parallel);
        let err = "round_robin".parse::<StrategyKind>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("round_robin"));
    }
}
