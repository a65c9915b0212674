//! Batch lifecycle manager.

use crate::config::BatchOptions;
use crate::types::{BatchState, BatchStatus, Outcome, Request};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

struct Inner {
    active: HashMap<String, BatchState>,
    history: VecDeque<BatchState>,
}

/// Owns every [`BatchState`]. Each read-modify sequence runs under one lock.
pub struct LifecycleManager {
    inner: Mutex<Inner>,
    history_capacity: usize,
}

impl LifecycleManager {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                active: HashMap::new(),
                history: VecDeque::new(),
            }),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Register a new batch in `created` state and return its id.
    pub async fn create(&self, requests: &[Request], options: BatchOptions) -> String {
        let batch_id = format!("batch-{}", Uuid::new_v4());
        let state = BatchState::new(batch_id.clone(), requests.len(), options);
        self.inner
            .lock()
            .await
            .active
            .insert(batch_id.clone(), state);
        debug!(batch_id = %batch_id, requests = requests.len(), "batch created");
        batch_id
    }

    /// Move a batch to `scheduled` and assign it an execution id.
    pub async fn schedule(&self, batch_id: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .active
            .get_mut(batch_id)
            .ok_or_else(|| Error::not_found(batch_id))?;
        transition(state, BatchStatus::Scheduled)?;
        let execution_id = Uuid::new_v4().to_string();
        state.execution_id = Some(execution_id.clone());
        state.scheduled_at = Some(Utc::now());
        Ok(execution_id)
    }

    /// Move a scheduled batch to `processing`. Returns `false` if it was
    /// cancelled in the meantime.
    pub async fn start(&self, batch_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .active
            .get_mut(batch_id)
            .ok_or_else(|| Error::not_found(batch_id))?;
        if state.status == BatchStatus::Cancelled {
            return Ok(false);
        }
        transition(state, BatchStatus::Processing)?;
        Ok(true)
    }

    /// Record outcomes and the terminal status. A batch cancelled while
    /// running stays `cancelled`. Returns the status the batch ended in.
    pub async fn finish(
        &self,
        batch_id: &str,
        outcomes: Vec<Outcome>,
        status: BatchStatus,
        error: Option<String>,
    ) -> Result<BatchStatus> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .active
            .get_mut(batch_id)
            .ok_or_else(|| Error::not_found(batch_id))?;
        if state.status != BatchStatus::Cancelled {
            transition(state, status)?;
        }
        state.outcomes = outcomes;
        state.completed_at = Some(Utc::now());
        if error.is_some() {
            state.error = error;
        }
        info!(
            batch_id = %batch_id,
            status = %state.status,
            outcomes = state.outcomes.len(),
            "batch finished"
        );
        Ok(state.status)
    }

    /// Copy of the current state, searching active batches then history.
    pub async fn get_status(&self, batch_id: &str) -> Option<BatchState> {
        let inner = self.inner.lock().await;
        if let Some(state) = inner.active.get(batch_id) {
            return Some(state.clone());
        }
        inner
            .history
            .iter()
            .rev()
            .find(|s| s.batch_id == batch_id)
            .cloned()
    }

    /// Mark a batch cancelled unless it is already terminal or unknown.
    pub async fn cancel(&self, batch_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.active.get_mut(batch_id) {
            Some(state) if state.status.can_transition_to(BatchStatus::Cancelled) => {
                state.status = BatchStatus::Cancelled;
                state.completed_at = Some(Utc::now());
                info!(batch_id = %batch_id, "batch cancelled");
                true
            }
            _ => false,
        }
    }

    /// Move a terminal batch into the bounded history.
    pub async fn archive(&self, batch_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let status = inner
            .active
            .get(batch_id)
            .map(|s| s.status)
            .ok_or_else(|| Error::not_found(batch_id))?;
        if !status.can_transition_to(BatchStatus::Archived) {
            return Err(Error::InvalidTransition {
                batch_id: batch_id.to_string(),
                from: status,
                to: BatchStatus::Archived,
            });
        }
        if let Some(mut state) = inner.active.remove(batch_id) {
            state.final_status = Some(state.status);
            state.status = BatchStatus::Archived;
            inner.history.push_back(state);
            while inner.history.len() > self.history_capacity {
                if let Some(evicted) = inner.history.pop_front() {
                    debug!(batch_id = %evicted.batch_id, "evicted from batch history");
                }
            }
        }
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history.len()
    }
}

fn transition(state: &mut BatchState, next: BatchStatus) -> Result<()> {
    if !state.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            batch_id: state.batch_id.clone(),
            from: state.status,
            to: next,
        });
    }
    state.status = next;
    Ok(())
}
