//! Batch lifecycle record

use super::outcome::Outcome;
use crate::config::BatchOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Archived,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Scheduled => 1,
            Self::Processing => 2,
            Self::Completed | Self::Failed | Self::Cancelled => 3,
            Self::Archived => 4,
        }
    }

    /// Transitions only move forward. Cancellation is reachable from any
    /// non-terminal state and archiving only from a terminal one.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        match next {
            Self::Archived => self.is_terminal(),
            Self::Cancelled => !self.is_terminal() && *self != Self::Archived,
            _ => !self.is_terminal() && *self != Self::Archived && next.rank() > self.rank(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State record of one batch, owned by the lifecycle manager.
///
/// Callers only ever see copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: String,
    pub execution_id: Option<String>,
    pub status: BatchStatus,
    /// Status the batch ended in before it was archived
    pub final_status: Option<BatchStatus>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub options: BatchOptions,
    pub request_count: usize,
    pub outcomes: Vec<Outcome>,
    pub error: Option<String>,
}

impl BatchState {
    pub fn new(batch_id: impl Into<String>, request_count: usize, options: BatchOptions) -> Self {
        Self {
            batch_id: batch_id.into(),
            execution_id: None,
            status: BatchStatus::Created,
            final_status: None,
            created_at: Utc::now(),
            scheduled_at: None,
            completed_at: None,
            options,
            request_count,
            outcomes: Vec::new(),
            error: None,
        }
    }

    /// Terminal status of the batch, looking through archiving.
    pub fn effective_status(&self) -> BatchStatus {
        match self.status {
            BatchStatus::Archived => self.final_status.unwrap_or(BatchStatus::Archived),
            s => s,
        }
    }
}
