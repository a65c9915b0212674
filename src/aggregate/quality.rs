//! Four-dimension quality scoring.

use super::consolidate::{record_timestamp, TIMESTAMP_FIELDS};
use super::stats::{mean, std_dev};
use crate::config::QualityThresholds;
use crate::types::{Outcome, Record};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Grade a shortfall below a threshold, in absolute score points.
    pub fn from_gap(gap: f64) -> Self {
        if gap >= 0.5 {
            Self::Critical
        } else if gap >= 0.3 {
            Self::High
        } else if gap >= 0.1 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Incomplete,
    Inaccurate,
    Inconsistent,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub issue_type: IssueType,
    pub affected_field: Option<String>,
    pub affected_count: usize,
    pub score: f64,
    pub threshold: f64,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    /// Mean of the four dimensions.
    pub overall: f64,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

impl QualityReport {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

/// Age band score: 1h, 1d, 1w and 30d boundaries.
pub fn age_score(age: Duration) -> f64 {
    if age <= Duration::hours(1) {
        1.0
    } else if age <= Duration::days(1) {
        0.8
    } else if age <= Duration::weeks(1) {
        0.6
    } else if age <= Duration::days(30) {
        0.4
    } else {
        0.2
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    thresholds: QualityThresholds,
}

impl QualityAssessor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(&self, outcomes: &[Outcome], records: &[Record], now: DateTime<Utc>) -> QualityReport {
        let completed: Vec<&Outcome> = outcomes.iter().filter(|o| o.is_success()).collect();
        let t = &self.thresholds;
        let mut issues = Vec::new();

        let completeness = ratio(completed.len(), outcomes.len());
        if completeness < t.completeness {
            issues.push(QualityIssue {
                severity: Severity::from_gap(t.completeness - completeness),
                issue_type: IssueType::Incomplete,
                affected_field: least_covered_field(records),
                affected_count: outcomes.len() - completed.len(),
                score: completeness,
                threshold: t.completeness,
                suggested_fix: "Retry failed and timed-out requests or raise timeout_per_request".into(),
            });
        }

        let empty = completed
            .iter()
            .filter(|o| o.record_count.unwrap_or(0) == 0)
            .count();
        let accuracy = if completed.is_empty() {
            0.0
        } else {
            ratio(completed.len() - empty, completed.len())
        };
        if accuracy < t.accuracy {
            issues.push(QualityIssue {
                severity: Severity::from_gap(t.accuracy - accuracy),
                issue_type: IssueType::Inaccurate,
                affected_field: None,
                affected_count: empty,
                score: accuracy,
                threshold: t.accuracy,
                suggested_fix: "Check extraction rules for sources that completed without records".into(),
            });
        }

        let (consistency, outliers) = consistency(&completed);
        if consistency < t.consistency {
            issues.push(QualityIssue {
                severity: Severity::from_gap(t.consistency - consistency),
                issue_type: IssueType::Inconsistent,
                affected_field: None,
                affected_count: outliers,
                score: consistency,
                threshold: t.consistency,
                suggested_fix: "Review sources whose record volume deviates from the batch".into(),
            });
        }

        let (timeliness, stale, stale_field) = timeliness(&completed, records, now);
        if timeliness < t.timeliness {
            issues.push(QualityIssue {
                severity: Severity::from_gap(t.timeliness - timeliness),
                issue_type: IssueType::Stale,
                affected_field: stale_field,
                affected_count: stale,
                score: timeliness,
                threshold: t.timeliness,
                suggested_fix: "Collect more frequently or check whether sources publish fresh data".into(),
            });
        }

        let recommendations = recommend(&issues);
        QualityReport {
            completeness,
            accuracy,
            consistency,
            timeliness,
            overall: (completeness + accuracy + consistency + timeliness) / 4.0,
            issues,
            recommendations,
            assessed_at: now,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// 1 - coefficient of variation of record counts (durations when no outcome
/// reports a count). Also returns how many samples lie over one standard
/// deviation from the mean.
fn consistency(completed: &[&Outcome]) -> (f64, usize) {
    let counts: Vec<f64> = completed
        .iter()
        .filter_map(|o| o.record_count.map(|c| c as f64))
        .collect();
    let samples = if counts.is_empty() {
        completed.iter().map(|o| o.duration).collect()
    } else {
        counts
    };
    if samples.len() < 2 {
        return (1.0, 0);
    }
    let m = mean(&samples);
    let sd = std_dev(&samples);
    if m <= 0.0 {
        return (1.0, 0);
    }
    let outliers = samples.iter().filter(|v| (*v - m).abs() > sd).count();
    ((1.0 - sd / m).clamp(0.0, 1.0), outliers)
}

/// Mean age-band score of record timestamps, falling back to outcome end
/// times. Also returns the number of entries older than a day and the
/// timestamp field most records used.
fn timeliness(
    completed: &[&Outcome],
    records: &[Record],
    now: DateTime<Utc>,
) -> (f64, usize, Option<String>) {
    let mut stamps: Vec<DateTime<Utc>> = records.iter().filter_map(record_timestamp).collect();
    let mut field = None;
    if stamps.is_empty() {
        stamps = completed.iter().filter_map(|o| o.finished_at).collect();
    } else {
        field = dominant_timestamp_field(records);
    }
    if stamps.is_empty() {
        return (0.0, 0, None);
    }
    let scores: Vec<f64> = stamps.iter().map(|ts| age_score(now - *ts)).collect();
    let stale = stamps
        .iter()
        .filter(|ts| now - **ts > Duration::days(1))
        .count();
    (mean(&scores), stale, field)
}

fn dominant_timestamp_field(records: &[Record]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        if let Some(f) = TIMESTAMP_FIELDS
            .iter()
            .find(|f| record.contains_key(**f))
        {
            *counts.entry(*f).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(f, _)| f.to_string())
}

fn least_covered_field(records: &[Record]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        for k in record.keys() {
            *counts.entry(k.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n < records.len())
        .min_by_key(|(_, n)| *n)
        .map(|(f, _)| f.to_string())
}

fn recommend(issues: &[QualityIssue]) -> Vec<String> {
    if issues.is_empty() {
        return vec!["Data quality meets all configured thresholds".to_string()];
    }
    let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
    let mut by_type: BTreeMap<IssueType, usize> = BTreeMap::new();
    for issue in issues {
        *by_severity.entry(issue.severity).or_default() += 1;
        *by_type.entry(issue.issue_type).or_default() += 1;
    }

    let mut out = Vec::new();
    if by_severity.contains_key(&Severity::Critical) {
        out.push("Critical data quality issues found; address before production use".to_string());
    }
    if by_severity.get(&Severity::High).copied().unwrap_or(0) >= 2 {
        out.push("Several high-severity issues; review source selection and batch options".to_string());
    }
    for issue_type in by_type.keys() {
        out.push(
            match issue_type {
                IssueType::Incomplete => "Improve completion rate: add retries or lengthen per-request timeouts",
                IssueType::Inaccurate => "Validate extraction output; completed requests returned no data",
                IssueType::Inconsistent => "Normalize collection across sources; record volumes vary widely",
                IssueType::Stale => "Schedule collection closer to publication time to improve freshness",
            }
            .to_string(),
        );
    }
    out
}
