use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ReviewError;
use crate::models::QueueTaskId;
use crate::queue::{ResultBackend, ReviewJob};
use crate::review::ReviewTask;

/// Callbacks the runner fires around every task. Implementations must not
/// fail: the task outcome is decided before `after_*` runs.
#[async_trait]
pub trait TaskHooks: Send + Sync {
    async fn before_run(&self, _task_id: &QueueTaskId) {}

    async fn after_success(&self, _task_id: &QueueTaskId, _result: &Value) {}

    async fn after_failure(&self, _task_id: &QueueTaskId, _error: &ReviewError) {}
}

/// Executes review jobs pulled off a queue.
pub struct Runner {
    task: ReviewTask,
    hooks: Arc<dyn TaskHooks>,
    backend: Arc<dyn ResultBackend>,
}

impl Runner {
    pub fn new(task: ReviewTask, hooks: Arc<dyn TaskHooks>, backend: Arc<dyn ResultBackend>) -> Self {
        Self {
            task,
            hooks,
            backend,
        }
    }

    pub async fn execute(&self, job: ReviewJob) {
        let id = &job.queue_task_id;
        tracing::info!(task_id = %id, "task received");

        if let Err(e) = self.backend.mark_started(id).await {
            tracing::error!(task_id = %id, error = %e, "could not record task start");
        }
        self.hooks.before_run(id).await;

        match self.task.run(id, &job.diff_blob).await {
            Ok(result) => {
                if let Err(e) = self.backend.store_success(id, &result).await {
                    tracing::error!(task_id = %id, error = %e, "could not record task result");
                }
                tracing::info!(task_id = %id, "task succeeded");
                self.hooks.after_success(id, &result).await;
            }
            Err(err) => {
                if let Err(e) = self.backend.store_failure(id, &err.to_string()).await {
                    tracing::error!(task_id = %id, error = %e, "could not record task failure");
                }
                tracing::warn!(task_id = %id, error = %err, "task failed");
                self.hooks.after_failure(id, &err).await;
            }
        }
    }
}
