#![allow(dead_code)]

use batch_engine::executor::{ExecutionContext, RequestExecutor};
use batch_engine::{BatchEngine, EngineConfig, Outcome, Request};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behaviour of the mock source for one request id.
#[derive(Clone)]
pub enum Behave {
    Ok { records: usize, delay: Duration },
    Fail,
    Raise,
    Hang,
}

/// Mock collection source keyed by request id.
pub struct MockSource {
    behaviours: HashMap<String, Behave>,
    default: Behave,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
    pub cancelled_seen: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            behaviours: HashMap::new(),
            default: Behave::Ok {
                records: 2,
                delay: Duration::from_millis(5),
            },
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            cancelled_seen: AtomicUsize::new(0),
        }
    }

    pub fn default_behaviour(mut self, b: Behave) -> Self {
        self.default = b;
        self
    }

    pub fn on(mut self, id: &str, b: Behave) -> Self {
        self.behaviours.insert(id.to_string(), b);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for MockSource {
    async fn execute(&self, request: &Request, ctx: &ExecutionContext) -> batch_engine::Result<Outcome> {
        self.calls.lock().unwrap().push(request.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let started = Utc::now();
        let behaviour = self
            .behaviours
            .get(&request.id)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        let result = match behaviour {
            Behave::Ok { records, delay } => {
                tokio::time::sleep(delay).await;
                Ok(Outcome::completed(request.id.clone(), started).with_records(records))
            }
            Behave::Fail => Ok(Outcome::failed(request.id.clone(), started, "source returned 500")),
            Behave::Raise => Err(batch_engine::Error::validation("malformed page")),
            Behave::Hang => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
                    _ = ctx.cancel.cancelled() => {
                        self.cancelled_seen.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Ok(Outcome::completed(request.id.clone(), started))
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "mock-source"
    }
}

pub fn requests(n: usize) -> Vec<Request> {
    (1..=n)
        .map(|i| Request::new(format!("req-{}", i), serde_json::json!({ "page": i })))
        .collect()
}

pub fn engine(source: Arc<MockSource>) -> BatchEngine {
    batch_engine::logging::init_tracing_with("warn");
    BatchEngine::new(
        EngineConfig::default().with_adaptive_pause(Duration::from_millis(1)),
        source,
    )
    .expect("engine config is valid")
}
