//! Per-request execution outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single request execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl OutcomeStatus {
    /// `completed`, `failed`, `timeout` and `cancelled` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// A failure that stops a batch when `continue_on_error` is off.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource counters reported for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU time in seconds
    pub cpu_time: f64,
    /// Wall-clock time in seconds
    pub wall_time: f64,
    pub peak_memory_mb: f64,
    pub avg_memory_mb: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_received: u64,
    /// Number of upstream calls made while serving the request
    pub request_count: u64,
}

/// Result of executing a single request.
///
/// Constructed by executors and strategies; treated as immutable once its
/// status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub request_id: String,
    pub status: OutcomeStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration: f64,
    #[serde(default)]
    pub resources: ResourceUsage,
    pub error: Option<String>,
    /// Number of records extracted, if the executor produced data
    pub record_count: Option<usize>,
    /// Where the extracted records were written
    pub data_location: Option<PathBuf>,
    /// Served from the outcome cache instead of a fresh execution
    #[serde(default)]
    pub cached: bool,
}

impl Outcome {
    fn finished(
        request_id: impl Into<String>,
        status: OutcomeStatus,
        started_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            request_id: request_id.into(),
            status,
            started_at,
            finished_at: Some(finished_at),
            duration,
            resources: ResourceUsage {
                wall_time: duration,
                ..Default::default()
            },
            error,
            record_count: None,
            data_location: None,
            cached: false,
        }
    }

    /// A request that has not started yet.
    pub fn pending(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: OutcomeStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            duration: 0.0,
            resources: ResourceUsage::default(),
            error: None,
            record_count: None,
            data_location: None,
            cached: false,
        }
    }

    pub fn completed(request_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finished(request_id, OutcomeStatus::Completed, started_at, None)
    }

    pub fn failed(
        request_id: impl Into<String>,
        started_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::finished(
            request_id,
            OutcomeStatus::Failed,
            started_at,
            Some(message.into()),
        )
    }

    /// Synthetic outcome for a request that overran its timeout.
    pub fn timeout(
        request_id: impl Into<String>,
        started_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        Self::finished(
            request_id,
            OutcomeStatus::Timeout,
            started_at,
            Some(format!("request exceeded timeout of {:?}", timeout)),
        )
    }

    pub fn cancelled(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::finished(
            request_id,
            OutcomeStatus::Cancelled,
            Utc::now(),
            Some(reason.into()),
        )
    }

    pub fn with_records(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }

    pub fn with_data_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_location = Some(path.into());
        self
    }

    pub fn with_resources(mut self, resources: ResourceUsage) -> Self {
        self.resources = resources;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}
