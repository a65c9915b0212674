use crate::aggregate::BatchResult;
use crate::types::BatchStatus;
use thiserror::Error;

/// Where an error came from: the offending field, extra detail and the
/// component that raised it. Rendered in parentheses after the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// e.g. `requests[3].id`, `options.max_concurrency`
    pub field_path: Option<String>,
    /// e.g. the offending value
    pub details: Option<String>,
    /// e.g. `submit`, `config_loader`, `env`
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn render(&self) -> String {
        let parts: Vec<String> = [
            ("field", &self.field_path),
            ("details", &self.details),
            ("source", &self.source),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!(" ({})", parts.join(", "))
        }
    }
}

/// Errors raised by the staging queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue is empty")]
    Empty,
}

/// Unified error type for the batch engine.
///
/// Per-request failures are never represented here; they are recorded as
/// [`Outcome`](crate::types::Outcome) values. Only submission-time validation,
/// early termination and orchestration faults reach the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {message}{}", .context.render())]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("bad configuration: {message}{}", .context.render())]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("unknown batch {batch_id}")]
    NotFound { batch_id: String },

    #[error("batch {batch_id} cannot move from {from} to {to}")]
    InvalidTransition {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },

    #[error("batch {batch_id} stopped after request '{request_id}' failed ({} of {} requests ran)", .partial.outcomes.len(), .partial.requested)]
    EarlyTermination {
        batch_id: String,
        request_id: String,
        partial: Box<BatchResult>,
    },

    #[error("batch {batch_id} (execution {execution_id}) aborted: {message}")]
    BatchExecution {
        batch_id: String,
        execution_id: String,
        message: String,
    },

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn not_found(batch_id: impl Into<String>) -> Self {
        Error::NotFound {
            batch_id: batch_id.into(),
        }
    }

    /// Context of validation and configuration errors.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. } | Error::Configuration { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// True for errors caused by malformed caller input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}
