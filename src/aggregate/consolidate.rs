//! Record consolidation: union, intersection, priority and temporal.

use crate::cache::content_hash;
use crate::types::Record;
use crate::{Error, ErrorContext, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::str::FromStr;

/// Fields inspected, in order, for a record's timestamp.
pub const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "date", "created_at", "updated_at"];

/// Bucket for records without a usable date.
pub const UNKNOWN_BUCKET: &str = "unknown";

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("static regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStrategy {
    #[default]
    Union,
    Intersection,
    Priority,
    Temporal,
}

impl ConsolidationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Intersection => "intersection",
            Self::Priority => "priority",
            Self::Temporal => "temporal",
        }
    }
}

impl std::fmt::Display for ConsolidationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsolidationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            "priority" => Ok(Self::Priority),
            "temporal" => Ok(Self::Temporal),
            other => Err(Error::validation_with_context(
                format!("unknown consolidation strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("consolidation")
                    .with_details("expected one of: union, intersection, priority, temporal"),
            )),
        }
    }
}

/// Date buckets produced by temporal consolidation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalSummary {
    /// `YYYY-MM-DD` (or `unknown`) to record count.
    pub buckets: BTreeMap<String, usize>,
    /// Earliest and latest dated bucket; `unknown` never takes part.
    pub range: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub strategy: ConsolidationStrategy,
    pub records: Vec<Record>,
    /// Share of output records carrying each field (key field excluded).
    pub field_coverage: BTreeMap<String, f64>,
    pub input_records: usize,
    pub duplicates_removed: usize,
    /// Records folded into an earlier one with the same identifier.
    pub merged: usize,
    pub temporal: Option<TemporalSummary>,
}

impl ConsolidationResult {
    fn new(strategy: ConsolidationStrategy, input_records: usize, records: Vec<Record>) -> Self {
        Self {
            strategy,
            records,
            field_coverage: BTreeMap::new(),
            input_records,
            duplicates_removed: 0,
            merged: 0,
            temporal: None,
        }
    }

    pub fn unique_records(&self) -> usize {
        self.records.len()
    }
}

/// Run `strategy` over `records`, identifying records by `key_field`.
pub fn consolidate(
    records: Vec<Record>,
    strategy: ConsolidationStrategy,
    key_field: &str,
) -> ConsolidationResult {
    let mut result = match strategy {
        ConsolidationStrategy::Union => union(records, key_field),
        ConsolidationStrategy::Intersection => intersection(records),
        ConsolidationStrategy::Priority => priority(records, key_field),
        ConsolidationStrategy::Temporal => temporal(records),
    };
    result.field_coverage = field_coverage(&result.records, key_field);
    result
}

/// First occurrence wins; later records with the same identity are dropped.
fn union(records: Vec<Record>, key_field: &str) -> ConsolidationResult {
    let input = records.len();
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for record in records {
        if seen.insert(identity(&record, key_field)) {
            unique.push(record);
        }
    }
    let mut result = ConsolidationResult::new(ConsolidationStrategy::Union, input, Vec::new());
    result.duplicates_removed = input - unique.len();
    result.records = unique;
    result
}

/// Keep only fields present in every input record.
fn intersection(records: Vec<Record>) -> ConsolidationResult {
    let input = records.len();
    let mut common: Option<BTreeSet<String>> = None;
    for record in &records {
        let keys: BTreeSet<String> = record.keys().cloned().collect();
        common = Some(match common {
            None => keys,
            Some(c) => c.intersection(&keys).cloned().collect(),
        });
    }
    let common = common.unwrap_or_default();
    let projected = records
        .into_iter()
        .map(|mut r| {
            r.retain(|k, _| common.contains(k));
            r
        })
        .collect();
    ConsolidationResult::new(ConsolidationStrategy::Intersection, input, projected)
}

/// Rank records by field count then recency and fold them, in rank order,
/// into one record per identifier. A record ranked later overwrites the
/// fields it shares with those before it.
fn priority(records: Vec<Record>, key_field: &str) -> ConsolidationResult {
    let input = records.len();
    let mut ranked: Vec<(usize, Option<DateTime<Utc>>, Record)> = records
        .into_iter()
        .map(|r| (r.len(), record_timestamp(&r), r))
        .collect();
    // stable: equal ranks keep arrival order
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Record> = HashMap::new();
    let mut merges = 0;
    for (_, _, record) in ranked {
        let id = identity(&record, key_field);
        match merged.get_mut(&id) {
            Some(existing) => {
                existing.extend(record);
                merges += 1;
            }
            None => {
                order.push(id.clone());
                merged.insert(id, record);
            }
        }
    }
    let records = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect();
    let mut result = ConsolidationResult::new(ConsolidationStrategy::Priority, input, records);
    result.merged = merges;
    result
}

/// Group by calendar date; output records are ordered by bucket, with
/// `unknown` last.
fn temporal(records: Vec<Record>) -> ConsolidationResult {
    let input = records.len();
    let mut grouped: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    let mut undated = Vec::new();
    for record in records {
        match record_date_key(&record) {
            Some(day) => grouped.entry(day).or_default().push(record),
            None => undated.push(record),
        }
    }

    let mut summary = TemporalSummary {
        buckets: grouped.iter().map(|(k, v)| (k.clone(), v.len())).collect(),
        range: None,
    };
    if let (Some(first), Some(last)) = (grouped.keys().next(), grouped.keys().next_back()) {
        summary.range = Some((first.clone(), last.clone()));
    }
    if !undated.is_empty() {
        summary.buckets.insert(UNKNOWN_BUCKET.to_string(), undated.len());
    }

    let mut ordered: Vec<Record> = grouped.into_values().flatten().collect();
    ordered.extend(undated);
    let mut result = ConsolidationResult::new(ConsolidationStrategy::Temporal, input, ordered);
    result.temporal = Some(summary);
    result
}

/// Drop null and empty-string fields, and turn numeric strings into numbers.
/// The key field is left untouched.
pub fn improve_quality(result: &mut ConsolidationResult, key_field: &str) {
    for record in &mut result.records {
        record.retain(|k, v| {
            k == key_field || !(v.is_null() || v.as_str().is_some_and(|s| s.trim().is_empty()))
        });
        for (k, v) in record.iter_mut() {
            if k == key_field {
                continue;
            }
            if let Some(n) = v.as_str().and_then(parse_number) {
                *v = n;
            }
        }
    }
    result.field_coverage = field_coverage(&result.records, key_field);
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Key-field value when present, otherwise a hash of the whole record.
/// Tagged by JSON type so `1` and `"1"` stay distinct.
fn identity(record: &Record, key_field: &str) -> String {
    match record.get(key_field) {
        Some(Value::String(s)) => format!("s:{}", s),
        Some(Value::Null) | None => format!("#{}", content_hash(&Value::Object(record.clone()))),
        Some(other) => format!("j:{}", other),
    }
}

fn field_coverage(records: &[Record], key_field: &str) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        for k in record.keys().filter(|k| k.as_str() != key_field) {
            *counts.entry(k.clone()).or_default() += 1;
        }
    }
    let total = records.len() as f64;
    counts
        .into_iter()
        .map(|(k, n)| (k, n as f64 / total))
        .collect()
}

/// First parseable timestamp among [`TIMESTAMP_FIELDS`].
pub fn record_timestamp(record: &Record) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|f| record.get(*f))
        .find_map(parse_timestamp)
}

/// Calendar date as written in the record. Strings keep their own date
/// regardless of offset; only epoch numbers go through UTC.
fn record_date_key(record: &Record) -> Option<String> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|f| record.get(*f))
        .find_map(|v| match v {
            Value::String(s) => DATE_PREFIX.captures(s.trim()).map(|c| c[1].to_string()),
            Value::Number(_) => parse_timestamp(v).map(|ts| ts.format("%Y-%m-%d").to_string()),
            _ => None,
        })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`, and epoch seconds
/// or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            // values beyond year ~5000 in seconds are taken as milliseconds
            let millis = if raw.abs() > 1e11 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}
