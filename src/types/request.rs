//! Collection request

use serde::{Deserialize, Serialize};

/// A single, independent collection request.
///
/// `id` must be unique within one batch submission. Higher `priority` drains
/// sooner when priority ordering is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    /// Opaque descriptor interpreted only by the request executor.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Request {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
