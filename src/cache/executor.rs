//! Caching decorator for request executors.

use super::key::CacheKeyGenerator;
use super::store::OutcomeCache;
use crate::executor::{ExecutionContext, RequestExecutor};
use crate::types::{Outcome, Request};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Serves repeated payloads from an [`OutcomeCache`].
///
/// A hit is re-stamped with the new request id and current time and flagged
/// `cached`; the inner executor is not called.
pub struct CachingExecutor {
    inner: Arc<dyn RequestExecutor>,
    cache: Arc<OutcomeCache>,
    keys: CacheKeyGenerator,
}

impl CachingExecutor {
    pub fn new(inner: Arc<dyn RequestExecutor>, cache: Arc<OutcomeCache>) -> Self {
        Self {
            inner,
            cache,
            keys: CacheKeyGenerator::new(),
        }
    }

    pub fn with_key_generator(mut self, keys: CacheKeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn cache(&self) -> &OutcomeCache {
        &self.cache
    }
}

#[async_trait]
impl RequestExecutor for CachingExecutor {
    async fn execute(&self, request: &Request, ctx: &ExecutionContext) -> Result<Outcome> {
        let key = self.keys.generate(&request.payload);
        if let Some(hit) = self.cache.get(&key) {
            debug!(
                batch_id = %ctx.batch_id,
                request_id = %request.id,
                key = %key,
                "outcome served from cache"
            );
            let now = Utc::now();
            return Ok(Outcome {
                request_id: request.id.clone(),
                started_at: now,
                finished_at: Some(now),
                duration: 0.0,
                cached: true,
                ..hit
            });
        }
        let outcome = self.inner.execute(request, ctx).await?;
        self.cache.insert(key, outcome.clone());
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "caching"
    }
}
