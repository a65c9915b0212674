mod common;

use batch_engine::{
    BatchEngine, BatchOptions, BatchStatus, EngineConfig, Error, OutcomeStatus, Request,
    StrategyKind,
};
use common::{engine, requests, Behave, MockSource};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn options(strategy: StrategyKind) -> BatchOptions {
    BatchOptions::default().with_strategy(strategy)
}

#[tokio::test]
async fn test_duplicate_ids_rejected_before_execution() {
    let source = Arc::new(MockSource::new());
    let engine = engine(source.clone());

    let mut batch = requests(3);
    batch.push(Request::new("req-2", serde_json::json!({})));
    let err = engine
        .submit(batch, BatchOptions::default())
        .await
        .expect_err("duplicate id must fail");
    assert!(err.is_validation());
    assert!(err.to_string().contains("req-2"));

    let err = engine
        .submit(Vec::new(), BatchOptions::default())
        .await
        .expect_err("empty batch must fail");
    assert!(err.is_validation());

    assert!(source.calls().is_empty(), "nothing may run after a rejected submit");
    assert_eq!(engine.active_batches().await, 0);
}

#[tokio::test]
async fn test_sequential_continues_past_failure() {
    let source = Arc::new(MockSource::new().on("req-3", Behave::Raise));
    let engine = engine(source.clone());

    let result = engine
        .run(requests(5), options(StrategyKind::Sequential))
        .await
        .expect("batch runs");

    assert_eq!(result.total, 5);
    assert_eq!(result.successful, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.outcomes[2].request_id, "req-3");
    assert_eq!(result.outcomes[2].status, OutcomeStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("malformed page"));
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(source.calls().len(), 5);
}

#[tokio::test]
async fn test_sequential_stops_when_continue_on_error_disabled() {
    let source = Arc::new(MockSource::new().on("req-3", Behave::Raise));
    let engine = engine(source.clone());

    let err = engine
        .run(
            requests(5),
            options(StrategyKind::Sequential).with_continue_on_error(false),
        )
        .await
        .expect_err("early stop is reported");

    match err {
        Error::EarlyTermination {
            batch_id,
            request_id,
            partial,
        } => {
            assert_eq!(request_id, "req-3");
            assert_eq!(partial.outcomes.len(), 3);
            assert_eq!(partial.requested, 5);
            assert_eq!(partial.status, BatchStatus::Failed);
            let ids: Vec<_> = partial.outcomes.iter().map(|o| o.request_id.as_str()).collect();
            assert_eq!(ids, vec!["req-1", "req-2", "req-3"]);

            let state = engine.status(&batch_id).await.expect("archived state");
            assert_eq!(state.status, BatchStatus::Archived);
            assert_eq!(state.effective_status(), BatchStatus::Failed);
            assert!(state.error.unwrap().contains("req-3"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(source.calls(), vec!["req-1", "req-2", "req-3"]);
}

#[tokio::test]
async fn test_parallel_and_adaptive_return_every_outcome() {
    for strategy in [StrategyKind::Parallel, StrategyKind::Adaptive] {
        let source = Arc::new(
            MockSource::new()
                .on("req-2", Behave::Fail)
                .on("req-5", Behave::Raise)
                .on("req-11", Behave::Fail),
        );
        let engine = engine(source.clone());
        let result = engine
            .run(requests(12), options(strategy).with_max_concurrency(4))
            .await
            .expect("batch runs");

        assert_eq!(result.total, 12, "strategy {}", strategy);
        assert_eq!(result.successful, 9);
        assert_eq!(result.failed, 3);
        assert!((result.success_rate - 0.75).abs() < 1e-9);
        assert!(result.success_rate >= 0.0 && result.success_rate <= 1.0);
        if strategy == StrategyKind::Parallel {
            assert!(source.peak.load(Ordering::SeqCst) <= 4);
        }
    }
}

#[tokio::test]
async fn test_adaptive_runs_are_recorded() {
    let source = Arc::new(MockSource::new());
    let engine = engine(source);
    engine
        .run(requests(6), options(StrategyKind::Adaptive))
        .await
        .expect("batch runs");
    engine
        .run(requests(3), options(StrategyKind::Adaptive))
        .await
        .expect("batch runs");

    let history = engine.adaptive_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].total_requests, 6);
    assert_eq!(history[0].concurrency_used, 6);
    assert_eq!(history[1].concurrency_used, 3);
    assert_eq!(history[1].success_rate, 1.0);
}

#[tokio::test]
async fn test_timeout_produces_outcome_and_fires_token() {
    let source = Arc::new(MockSource::new().on("req-2", Behave::Hang));
    let engine = engine(source.clone());
    let timeout = Duration::from_millis(50);

    let result = engine
        .run(
            requests(3),
            options(StrategyKind::Parallel).with_timeout(timeout),
        )
        .await
        .expect("batch runs");

    let timed_out = result
        .outcomes
        .iter()
        .find(|o| o.request_id == "req-2")
        .expect("req-2 outcome");
    assert_eq!(timed_out.status, OutcomeStatus::Timeout);
    assert!(timed_out
        .error
        .as_deref()
        .unwrap()
        .contains(&format!("{:?}", timeout)));
    assert_eq!(result.timed_out, 1);

    // the abandoned call notices its token shortly afterwards
    for _ in 0..50 {
        if source.cancelled_seen.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(source.cancelled_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_running_batch() {
    let source = Arc::new(MockSource::new().default_behaviour(Behave::Hang));
    let engine = engine(source.clone());
    let batch_id = engine
        .submit(
            requests(3),
            options(StrategyKind::Sequential).with_timeout(Duration::from_secs(60)),
        )
        .await
        .expect("submit");

    // 1. wait for the first request to be in flight
    for _ in 0..200 {
        if !source.calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(engine.result(&batch_id).is_none(), "no result before terminal state");

    // 2. cancel: in-flight request is told to stop, the rest never start
    assert!(engine.cancel(&batch_id).await);
    let result = engine.wait(&batch_id).await.expect("result after cancel");
    assert_eq!(result.status, BatchStatus::Cancelled);
    assert_eq!(result.total, 3);
    assert_eq!(result.cancelled, 2);
    assert_eq!(source.calls(), vec!["req-1"]);
    assert_eq!(source.cancelled_seen.load(Ordering::SeqCst), 1);

    // 3. already terminal
    assert!(!engine.cancel(&batch_id).await);
    assert!(engine.result(&batch_id).is_some());
    assert_eq!(
        engine.status(&batch_id).await.unwrap().effective_status(),
        BatchStatus::Cancelled
    );
}

#[tokio::test]
async fn test_unknown_batch() {
    let engine = engine(Arc::new(MockSource::new()));
    assert!(engine.status("batch-missing").await.is_none());
    assert!(engine.result("batch-missing").is_none());
    assert!(!engine.cancel("batch-missing").await);
    assert!(matches!(
        engine.wait("batch-missing").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_failure_threshold_decides_final_status() {
    let source = Arc::new(
        MockSource::new()
            .on("req-1", Behave::Fail)
            .on("req-2", Behave::Fail)
            .on("req-3", Behave::Fail),
    );
    let engine = engine(source);
    let result = engine
        .run(requests(4), options(StrategyKind::Parallel))
        .await
        .expect("batch runs");
    assert_eq!(result.status, BatchStatus::Failed);

    let lenient = engine
        .run(
            requests(4),
            options(StrategyKind::Parallel).with_failure_threshold(0.8),
        )
        .await
        .expect("batch runs");
    assert_eq!(lenient.status, BatchStatus::Completed);
}

#[tokio::test]
async fn test_priority_ordering_drives_sequential_order() {
    let source = Arc::new(MockSource::new());
    let engine = engine(source.clone());
    let batch = vec![
        Request::new("standings", serde_json::json!({})),
        Request::new("live", serde_json::json!({})).with_priority(10),
        Request::new("weather", serde_json::json!({})).with_priority(3),
        Request::new("lottery", serde_json::json!({})),
    ];
    engine
        .run(batch, options(StrategyKind::Sequential))
        .await
        .expect("batch runs");
    assert_eq!(source.calls(), vec!["live", "weather", "standings", "lottery"]);
}

#[tokio::test]
async fn test_caching_reuses_completed_outcomes() {
    let source = Arc::new(MockSource::new());
    let engine = engine(source.clone());
    let batch = vec![
        Request::new("a", serde_json::json!({"source": "scores", "league": 1})),
        Request::new("b", serde_json::json!({"league": 1, "source": "scores"})),
        Request::new("c", serde_json::json!({"source": "weather"})),
    ];
    let result = engine
        .run(batch, options(StrategyKind::Sequential).with_caching(true))
        .await
        .expect("batch runs");

    assert_eq!(source.calls(), vec!["a", "c"]);
    assert_eq!(result.successful, 3);
    let b = result.outcomes.iter().find(|o| o.request_id == "b").unwrap();
    assert!(b.cached);
    assert_eq!(engine.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_quality_report_attached() {
    let source = Arc::new(MockSource::new().on("req-4", Behave::Fail));
    let engine = engine(source);
    let result = engine
        .run(requests(4), options(StrategyKind::Parallel))
        .await
        .expect("batch runs");
    let quality = result.quality.as_ref().expect("quality report");
    assert_eq!(quality.completeness, 0.75);
    assert!(quality.overall > 0.0 && quality.overall <= 1.0);
    assert!(!quality.issues.is_empty());
}

#[tokio::test]
async fn test_configured_defaults_drive_default_runs() {
    let source = Arc::new(MockSource::new());
    let defaults = BatchOptions::default()
        .with_strategy(StrategyKind::Parallel)
        .with_max_concurrency(1);
    let engine = BatchEngine::new(
        EngineConfig::default().with_defaults(defaults),
        source.clone(),
    )
    .expect("engine config is valid");

    assert_eq!(engine.default_options().max_concurrency, 1);
    let result = engine.run_default(requests(8)).await.expect("batch runs");

    assert_eq!(result.successful, 8);
    assert_eq!(source.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_result_registry_keeps_latest_batches() {
    let source = Arc::new(MockSource::new());
    let engine = BatchEngine::new(
        EngineConfig::default().with_history_capacity(2),
        source,
    )
    .expect("engine config is valid");

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = engine
            .submit(requests(2), options(StrategyKind::Sequential))
            .await
            .expect("submit");
        engine.wait(&id).await.expect("batch finishes");
        ids.push(id);
    }

    assert!(engine.result(&ids[0]).is_none());
    assert!(engine.result(&ids[1]).is_some());
    assert!(engine.result(&ids[2]).is_some());
}
