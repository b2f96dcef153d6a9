use std::sync::Arc;

use crate::error::ReviewError;
use crate::models::{QueueTaskId, TaskStatus, TaskStatusResponse};
use crate::queue::{LiveState, TaskQueue};
use crate::store::TaskStore;

const UNKNOWN_FAILURE: &str = "task failed";

/// Clients only see `pending` until a task is terminal.
fn client_state(state: LiveState) -> LiveState {
    match state {
        LiveState::Started => LiveState::Pending,
        other => other,
    }
}

/// Read-only view of a task for polling clients. The queue's live status wins;
/// the task record is only consulted when the queue has no entry for the id.
pub struct StatusQuery {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
}

impl StatusQuery {
    pub fn new(queue: Arc<dyn TaskQueue>, store: Arc<dyn TaskStore>) -> Self {
        Self { queue, store }
    }

    pub async fn query(&self, task_id: &str) -> Result<TaskStatusResponse, ReviewError> {
        let id = QueueTaskId::from(task_id);

        if let Some(live) = self.queue.status(&id).await? {
            let mut response = TaskStatusResponse {
                task_id: task_id.to_string(),
                status: client_state(live.state).as_str().to_string(),
                result: None,
                error: None,
            };
            match live.state {
                LiveState::Success => response.result = live.result,
                LiveState::Failure => {
                    response.error = Some(
                        live.error
                            .filter(|e| !e.is_empty())
                            .unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
                    )
                }
                LiveState::Pending | LiveState::Started => {}
            }
            return Ok(response);
        }

        let record = self.store.find_by_queue_task_id(&id).await?;
        let (status, result, error) = match record.status {
            TaskStatus::Unset | TaskStatus::Pending => (LiveState::Pending, None, None),
            TaskStatus::Success => (
                LiveState::Success,
                record.analysis_result.as_ref().map(|a| a.to_value()),
                None,
            ),
            TaskStatus::Failure => (LiveState::Failure, None, Some(UNKNOWN_FAILURE.to_string())),
        };

        Ok(TaskStatusResponse {
            task_id: task_id.to_string(),
            status: status.as_str().to_string(),
            result,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credential, NewTaskRecord};
    use crate::queue::{LiveStatus, MemoryResultBackend, ResultBackend, ReviewJob};
    use crate::store::MemoryTaskStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct BackendOnlyQueue(Arc<MemoryResultBackend>);

    #[async_trait]
    impl TaskQueue for BackendOnlyQueue {
        async fn submit(&self, job: ReviewJob) -> Result<QueueTaskId, ReviewError> {
            self.0.mark_pending(&job.queue_task_id).await?;
            Ok(job.queue_task_id)
        }

        async fn status(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError> {
            self.0.fetch(id).await
        }
    }

    fn query_over(backend: &Arc<MemoryResultBackend>, store: &Arc<MemoryTaskStore>) -> StatusQuery {
        StatusQuery::new(Arc::new(BackendOnlyQueue(backend.clone())), store.clone())
    }

    #[tokio::test]
    async fn live_success_attaches_return_value() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        let id = QueueTaskId::from("t1");
        backend.store_success(&id, &json!({"bugs": []})).await.unwrap();

        let response = query_over(&backend, &store).query("t1").await.unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.result, Some(json!({"bugs": []})));
        assert_eq!(response.error, None);
    }

    #[tokio::test]
    async fn live_failure_attaches_error_string() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        let id = QueueTaskId::from("t2");
        backend.store_failure(&id, "malformed inference response: eof").await.unwrap();

        let response = query_over(&backend, &store).query("t2").await.unwrap();
        assert_eq!(response.status, "failure");
        assert_eq!(response.result, None);
        assert_eq!(response.error.as_deref(), Some("malformed inference response: eof"));
    }

    #[tokio::test]
    async fn pending_task_has_neither_result_nor_error() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        backend.mark_pending(&QueueTaskId::from("t3")).await.unwrap();

        let response = query_over(&backend, &store).query("t3").await.unwrap();
        assert_eq!(response.status, "pending");
        assert!(response.result.is_none() && response.error.is_none());
    }

    #[tokio::test]
    async fn started_task_is_reported_as_pending() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        backend.mark_started(&QueueTaskId::from("t5")).await.unwrap();

        let response = query_over(&backend, &store).query("t5").await.unwrap();
        assert_eq!(response.status, "pending");
        assert!(response.result.is_none() && response.error.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_task_record_when_queue_has_no_entry() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        let record = store
            .create(NewTaskRecord {
                repo_url: "https://github.com/octo/hello".into(),
                pr_number: 1,
                credential: Credential::new("t"),
                diff_blob: "diff".into(),
            })
            .await
            .unwrap();
        store
            .set_queue_task_id(&record, &QueueTaskId::from("t4"))
            .await
            .unwrap();

        let response = query_over(&backend, &store).query("t4").await.unwrap();
        assert_eq!(response.status, "pending");
    }

    #[tokio::test]
    async fn unknown_everywhere_is_not_found() {
        let backend = Arc::new(MemoryResultBackend::new());
        let store = Arc::new(MemoryTaskStore::new());
        let err = query_over(&backend, &store).query("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
