//! 单请求执行器契约：执行一个请求并返回终态结果。
//!
//! Single-request executor contract.
//!
//! The engine never extracts data itself. It hands each [`Request`] to a
//! [`RequestExecutor`], which must be safe for concurrent use and should report
//! recoverable problems as a `failed`/`timeout` [`Outcome`] instead of an `Err`.
//! An `Err` is reserved for infrastructure faults; strategies still convert it
//! into a `failed` outcome so sibling requests are unaffected.

use crate::types::{Outcome, Request};
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call context handed to the executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub timeout: Duration,
    /// Cancelled when the request times out or the batch is cancelled.
    /// Cooperative executors should stop when it fires.
    pub cancel: CancellationToken,
    pub batch_id: String,
}

impl ExecutionContext {
    pub fn new(batch_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
            batch_id: batch_id.into(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &Request, ctx: &ExecutionContext) -> Result<Outcome>;

    fn name(&self) -> &'static str {
        "executor"
    }
}

#[async_trait]
impl<T: RequestExecutor + ?Sized> RequestExecutor for Arc<T> {
    async fn execute(&self, request: &Request, ctx: &ExecutionContext) -> Result<Outcome> {
        (**self).execute(request, ctx).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Adapter turning an async closure into a [`RequestExecutor`].
///
/// ```rust
/// use batch_engine::executor::{ExecutionContext, FnExecutor};
/// use batch_engine::types::{Outcome, Request};
///
/// let exec = FnExecutor::new(|req: Request, _ctx: ExecutionContext| async move {
///     Ok(Outcome::completed(req.id, chrono::Utc::now()).with_records(1))
/// });
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(Request, ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Outcome>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RequestExecutor for FnExecutor<F>
where
    F: Fn(Request, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome>> + Send,
{
    async fn execute(&self, request: &Request, ctx: &ExecutionContext) -> Result<Outcome> {
        (self.f)(request.clone(), ctx.clone()).await
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}
