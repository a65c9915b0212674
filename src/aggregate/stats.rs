//! Resource totals and duration statistics.

use crate::types::{Outcome, OutcomeStatus};
use serde::{Deserialize, Serialize};

/// Resource usage summed across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub cpu_time: f64,
    pub wall_time: f64,
    /// Maximum over outcomes.
    pub peak_memory_mb: f64,
    /// Mean over outcomes.
    pub avg_memory_mb: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_received: u64,
    pub request_count: u64,
}

impl ResourceTotals {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut totals = outcomes.iter().fold(Self::default(), |mut acc, o| {
            let r = &o.resources;
            acc.cpu_time += r.cpu_time;
            acc.wall_time += r.wall_time;
            acc.peak_memory_mb = acc.peak_memory_mb.max(r.peak_memory_mb);
            acc.avg_memory_mb += r.avg_memory_mb;
            acc.network_bytes_sent += r.network_bytes_sent;
            acc.network_bytes_received += r.network_bytes_received;
            acc.request_count += r.request_count;
            acc
        });
        if !outcomes.is_empty() {
            totals.avg_memory_mb /= outcomes.len() as f64;
        }
        totals
    }
}

/// Duration distribution (seconds) and per-status rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub min_duration: f64,
    pub max_duration: f64,
    pub median_duration: f64,
    /// Population standard deviation.
    pub std_duration: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub timeout_rate: f64,
    pub cancellation_rate: f64,
}

impl PerformanceStats {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        if outcomes.is_empty() {
            return Self::default();
        }
        let mut durations: Vec<f64> = outcomes.iter().map(|o| o.duration).collect();
        durations.sort_by(|a, b| a.total_cmp(b));

        let n = outcomes.len() as f64;
        let rate = |status: OutcomeStatus| {
            outcomes.iter().filter(|o| o.status == status).count() as f64 / n
        };
        Self {
            min_duration: durations[0],
            max_duration: durations[durations.len() - 1],
            median_duration: median(&durations),
            std_duration: std_dev(&durations),
            success_rate: rate(OutcomeStatus::Completed),
            failure_rate: rate(OutcomeStatus::Failed),
            timeout_rate: rate(OutcomeStatus::Timeout),
            cancellation_rate: rate(OutcomeStatus::Cancelled),
        }
    }
}

/// Median of an already sorted slice; 0 when empty.
pub(crate) fn median(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
