use batch_engine::aggregate::{consolidate, improve_quality, UNKNOWN_BUCKET};
use batch_engine::executor::{ExecutionContext, FnExecutor};
use batch_engine::{
    BatchEngine, BatchOptions, ConsolidationStrategy, EngineConfig, Outcome, Record, Request,
    StrategyKind,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn records(values: &[Value]) -> Vec<Record> {
    values
        .iter()
        .map(|v| v.as_object().cloned().expect("object"))
        .collect()
}

#[test]
fn test_union_dedups_by_key() {
    let out = consolidate(
        records(&[
            json!({"id": "a", "x": 1}),
            json!({"id": "a", "x": 2}),
            json!({"id": "b", "y": 1}),
        ]),
        ConsolidationStrategy::Union,
        "id",
    );
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.duplicates_removed, 1);
    assert_eq!(out.records[0]["x"], json!(1));
    assert_eq!(
        out.field_coverage.into_iter().collect::<Vec<_>>(),
        vec![("x".to_string(), 0.5), ("y".to_string(), 0.5)]
    );
}

#[test]
fn test_intersection_drops_uncommon_fields() {
    let out = consolidate(
        records(&[json!({"a": 1, "b": 2}), json!({"a": 5, "c": 3})]),
        ConsolidationStrategy::Intersection,
        "id",
    );
    assert!(out
        .records
        .iter()
        .all(|r| r.len() == 1 && r.contains_key("a")));
}

#[test]
fn test_priority_later_ranked_record_overwrites() {
    let out = consolidate(
        records(&[
            json!({"id": "m", "home": "North", "score": "0-0"}),
            json!({"id": "m", "home": "North", "score": "2-1", "venue": "Arena"}),
        ]),
        ConsolidationStrategy::Priority,
        "id",
    );
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.merged, 1);
    // the four-field record ranks first; the three-field one is folded over it
    assert_eq!(out.records[0]["score"], json!("0-0"));
    assert_eq!(out.records[0]["venue"], json!("Arena"));
}

#[test]
fn test_temporal_with_cleanup() {
    let mut out = consolidate(
        records(&[
            json!({"id": "d1", "date": "2024-02-29", "temp": "4.5"}),
            json!({"id": "d2", "date": "2024-03-01T06:00:00Z", "temp": ""}),
            json!({"id": "d3", "temp": "7"}),
        ]),
        ConsolidationStrategy::Temporal,
        "id",
    );
    improve_quality(&mut out, "id");
    let summary = out.temporal.as_ref().expect("temporal summary");
    assert_eq!(summary.buckets.len(), 3);
    assert_eq!(summary.buckets[UNKNOWN_BUCKET], 1);
    assert_eq!(
        summary.range,
        Some(("2024-02-29".to_string(), "2024-03-01".to_string()))
    );
    assert_eq!(out.records[0]["temp"], json!(4.5));
    assert!(!out.records[1].contains_key("temp"));
}

#[tokio::test]
async fn test_engine_consolidates_records_written_by_executor() {
    let dir = std::env::temp_dir().join(format!("batch-engine-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let out_dir = dir.clone();

    // each request writes its records to a JSON file and reports the path
    let executor = Arc::new(FnExecutor::new(move |req: Request, _ctx: ExecutionContext| {
        let out_dir = out_dir.clone();
        async move {
            let started = chrono::Utc::now();
            let team = req.payload["team"].as_str().unwrap_or("unknown").to_string();
            let rows = json!([
                {"id": format!("{}-home", team), "team": team, "updated_at": started.to_rfc3339()},
                {"id": "shared", "team": team, "updated_at": started.to_rfc3339()},
            ]);
            let path = out_dir.join(format!("{}.json", req.id));
            if let Err(e) = std::fs::write(&path, rows.to_string()) {
                return Ok(Outcome::failed(req.id, started, e.to_string()));
            }
            Ok::<_, batch_engine::Error>(Outcome::completed(req.id, started)
                .with_records(2)
                .with_data_location(path))
        }
    }));

    let engine = BatchEngine::new(EngineConfig::default(), executor).expect("engine");
    let batch = vec![
        Request::new("r1", json!({"team": "north"})),
        Request::new("r2", json!({"team": "south"})),
        Request::new("r3", json!({"team": "east"})),
    ];
    let result = engine
        .run(
            batch,
            BatchOptions::default()
                .with_strategy(StrategyKind::Sequential)
                .with_consolidation(ConsolidationStrategy::Union),
        )
        .await
        .expect("batch runs");

    let merged = result.consolidated_data.as_ref().expect("records consolidated");
    assert_eq!(merged.input_records, 6);
    assert_eq!(merged.records.len(), 4);
    assert_eq!(merged.duplicates_removed, 2);
    let shared = merged.records.iter().find(|r| r["id"] == json!("shared")).unwrap();
    assert_eq!(shared["team"], json!("north"));

    let quality = result.quality.as_ref().expect("quality");
    assert_eq!(quality.timeliness, 1.0);
    assert_eq!(quality.accuracy, 1.0);

    let _ = std::fs::remove_dir_all(dir);
}
