//! 结果聚合模块：统计、数据合并与质量评估。
//!
//! # Result Aggregation Module
//!
//! Turns the outcomes of a finished batch into a single [`BatchResult`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResultAggregator`] | Builds a [`BatchResult`] from a terminal [`BatchState`] |
//! | [`ConsolidationStrategy`] | `union`, `intersection`, `priority` or `temporal` |
//! | [`ConsolidationResult`] | Merged records, field coverage, duplicate and merge counts |
//! | [`QualityAssessor`] | Scores completeness, accuracy, consistency and timeliness |
//! | [`PerformanceStats`] / [`ResourceTotals`] | Duration statistics and resource sums |
//!
//! ## Records
//!
//! Extracted records are either handed in by the caller or loaded from the
//! `data_location` of each completed outcome (a JSON array, a single JSON
//! object, or JSON lines). A failure while loading or consolidating is logged
//! and leaves `consolidated_data` empty; the rest of the result is still built.
//!
//! ## Example
//!
//! ```rust
//! use batch_engine::aggregate::{consolidate, ConsolidationStrategy};
//! use serde_json::json;
//!
//! let records = vec![
//!     json!({"id": "a", "x": 1}).as_object().cloned().unwrap(),
//!     json!({"id": "a", "x": 2}).as_object().cloned().unwrap(),
//! ];
//! let merged = consolidate(records, ConsolidationStrategy::Union, "id");
//! assert_eq!(merged.duplicates_removed, 1);
//! ```

mod consolidate;
mod quality;
mod stats;

pub use consolidate::{
    consolidate, improve_quality, parse_timestamp, record_timestamp, ConsolidationResult,
    ConsolidationStrategy, TemporalSummary, TIMESTAMP_FIELDS, UNKNOWN_BUCKET,
};
pub use quality::{age_score, IssueType, QualityAssessor, QualityIssue, QualityReport, Severity};
pub use stats::{PerformanceStats, ResourceTotals};

use crate::config::{EngineConfig, QualityThresholds, StrategyKind};
use crate::types::{BatchState, BatchStatus, Outcome, OutcomeStatus, Record};
use crate::{Error, ErrorContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// One failed or timed-out request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub request_id: String,
    pub status: OutcomeStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: f64,
}

/// Consolidated view of one finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub execution_id: Option<String>,
    pub strategy: StrategyKind,
    pub status: BatchStatus,
    /// Requests submitted; more than `total` after an early stop.
    pub requested: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub success_rate: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between `start_time` and `end_time`.
    pub total_duration: f64,
    /// Successful requests per minute.
    pub throughput: f64,
    pub resources: ResourceTotals,
    pub performance: PerformanceStats,
    pub consolidated_data: Option<ConsolidationResult>,
    pub quality: Option<QualityReport>,
    pub errors: Vec<ErrorEntry>,
    pub outcomes: Vec<Outcome>,
    pub generated_at: DateTime<Utc>,
}

impl BatchResult {
    /// Fewer outcomes than requests and not because of cancellation.
    pub fn stopped_early(&self) -> bool {
        self.total < self.requested && self.status != BatchStatus::Cancelled
    }

    /// First failed or timed-out request, in outcome order.
    pub fn first_error(&self) -> Option<&ErrorEntry> {
        self.errors.first()
    }
}

/// Settings shared by every aggregation on an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub key_field: String,
    pub improve_quality: bool,
    pub thresholds: QualityThresholds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            key_field: "id".to_string(),
            improve_quality: false,
            thresholds: QualityThresholds::default(),
        }
    }
}

impl From<&EngineConfig> for AggregatorConfig {
    fn from(c: &EngineConfig) -> Self {
        Self {
            key_field: c.key_field.clone(),
            improve_quality: c.improve_quality,
            thresholds: c.quality_thresholds.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    config: AggregatorConfig,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Build the result for a terminal batch.
    ///
    /// With `records = None`, records are read from the outcomes'
    /// `data_location`s; when no outcome has one there is nothing to
    /// consolidate.
    pub fn aggregate(&self, state: &BatchState, records: Option<Vec<Record>>) -> BatchResult {
        let outcomes = &state.outcomes;
        let count = |s: OutcomeStatus| outcomes.iter().filter(|o| o.status == s).count();
        let total = outcomes.len();
        let successful = count(OutcomeStatus::Completed);

        let start_time = outcomes.iter().map(|o| o.started_at).min();
        let end_time = outcomes
            .iter()
            .filter(|o| o.status.is_terminal())
            .filter_map(|o| o.finished_at)
            .max();
        let total_duration = match (start_time, end_time) {
            (Some(s), Some(e)) => (e - s).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0),
            _ => 0.0,
        };
        let throughput = if total_duration > 0.0 {
            successful as f64 / (total_duration / 60.0)
        } else {
            0.0
        };

        let records = match records {
            Some(r) => Some(r),
            None => match load_records(outcomes) {
                Ok(r) => r,
                Err(e) => {
                    warn!(batch_id = %state.batch_id, error = %e, "failed to load extracted records");
                    None
                }
            },
        };
        let consolidated_data = records.map(|r| {
            let mut merged = consolidate(r, state.options.consolidation, &self.config.key_field);
            if self.config.improve_quality {
                improve_quality(&mut merged, &self.config.key_field);
            }
            debug!(
                batch_id = %state.batch_id,
                strategy = %merged.strategy,
                input = merged.input_records,
                unique = merged.records.len(),
                "records consolidated"
            );
            merged
        });

        let now = Utc::now();
        let quality = (!outcomes.is_empty()).then(|| {
            let records = consolidated_data
                .as_ref()
                .map(|c| c.records.as_slice())
                .unwrap_or(&[]);
            QualityAssessor::new(self.config.thresholds.clone()).assess(outcomes, records, now)
        });

        let errors = outcomes
            .iter()
            .filter(|o| o.status.is_error())
            .map(|o| ErrorEntry {
                request_id: o.request_id.clone(),
                status: o.status,
                message: o.error.clone().unwrap_or_else(|| o.status.to_string()),
                started_at: o.started_at,
                finished_at: o.finished_at,
                duration: o.duration,
            })
            .collect();

        BatchResult {
            batch_id: state.batch_id.clone(),
            execution_id: state.execution_id.clone(),
            strategy: state.options.strategy,
            status: state.effective_status(),
            requested: state.request_count,
            total,
            successful,
            failed: count(OutcomeStatus::Failed),
            timed_out: count(OutcomeStatus::Timeout),
            cancelled: count(OutcomeStatus::Cancelled),
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            start_time,
            end_time,
            total_duration,
            throughput,
            resources: ResourceTotals::from_outcomes(outcomes),
            performance: PerformanceStats::from_outcomes(outcomes),
            consolidated_data,
            quality,
            errors,
            outcomes: outcomes.clone(),
            generated_at: now,
        }
    }
}

/// Read records from every completed outcome that has a `data_location`.
/// `Ok(None)` when no outcome points at data.
pub fn load_records(outcomes: &[Outcome]) -> Result<Option<Vec<Record>>> {
    let mut found = false;
    let mut records = Vec::new();
    for path in outcomes
        .iter()
        .filter(|o| o.is_success())
        .filter_map(|o| o.data_location.as_deref())
    {
        found = true;
        records.extend(read_record_file(path)?);
    }
    Ok(found.then_some(records))
}

fn read_record_file(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else if let Ok(single) = serde_json::from_str::<Value>(trimmed) {
        vec![single]
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(serde_json::from_str::<Value>)
            .collect::<std::result::Result<_, _>>()?
    };
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Object(map) => Ok(map),
            other => Err(Error::validation_with_context(
                "extracted record is not a JSON object",
                ErrorContext::new()
                    .with_field_path(format!("{}[{}]", path.display(), i))
                    .with_details(other.to_string()),
            )),
        })
        .collect()
}
