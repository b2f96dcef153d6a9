use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ReviewError;
use crate::lifecycle::LifecycleEvent;
use crate::models::QueueTaskId;
use crate::store::TaskStore;
use crate::worker::TaskHooks;

/// Moves the task record through its lifecycle as the runner reports
/// progress. Hooks for ids without a linked record are ignored, and store
/// errors are logged rather than returned.
pub struct LifecycleHooks {
    store: Arc<dyn TaskStore>,
}

impl LifecycleHooks {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    async fn apply(&self, task_id: &QueueTaskId, event: LifecycleEvent) {
        let target = event.target();
        let record = match self.store.find_by_queue_task_id(task_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                tracing::debug!(task_id = %task_id, "no task record linked yet, skipping hook");
                return;
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "hook could not load task record");
                return;
            }
        };

        let record = if target.is_terminal() {
            match self.store.ensure_started(&record).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "hook could not start task record");
                    return;
                }
            }
        } else {
            record
        };

        match self.store.advance(&record, event).await {
            Ok(updated) => {
                tracing::info!(task_id = %task_id, status = %updated.status, "task status updated")
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, to = %target, error = %e, "hook could not update status")
            }
        }
    }
}

#[async_trait]
impl TaskHooks for LifecycleHooks {
    async fn before_run(&self, task_id: &QueueTaskId) {
        self.apply(task_id, LifecycleEvent::Started).await;
    }

    async fn after_success(&self, task_id: &QueueTaskId, _result: &Value) {
        self.apply(task_id, LifecycleEvent::Succeeded { analysis: None })
            .await;
    }

    async fn after_failure(&self, task_id: &QueueTaskId, _error: &ReviewError) {
        self.apply(task_id, LifecycleEvent::Failed).await;
    }
}
