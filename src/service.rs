use std::sync::Arc;

use crate::error::ReviewError;
use crate::github::DiffFetcher;
use crate::lifecycle::LifecycleEvent;
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, NewTaskRecord, QueueTaskId, TaskRecord,
    TaskResultsResponse, TaskStatusResponse,
};
use crate::queue::{ReviewJob, TaskQueue};
use crate::status::StatusQuery;
use crate::store::TaskStore;

/// Entry points used by the HTTP layer.
pub struct ReviewService {
    fetcher: DiffFetcher,
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    status: StatusQuery,
}

impl ReviewService {
    pub fn new(fetcher: DiffFetcher, store: Arc<dyn TaskStore>, queue: Arc<dyn TaskQueue>) -> Self {
        let status = StatusQuery::new(queue.clone(), store.clone());
        Self {
            fetcher,
            store,
            queue,
            status,
        }
    }

    /// Fetches the diff, persists a task record and enqueues the review.
    /// Returns as soon as the job is published.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, ReviewError> {
        let diff_blob = self
            .fetcher
            .fetch(&request.repo_url, request.pr_number, &request.credential)
            .await?;
        if diff_blob.trim().is_empty() {
            return Err(ReviewError::Validation(
                "pull request has no changed files".into(),
            ));
        }

        let record = self
            .store
            .create(NewTaskRecord {
                repo_url: request.repo_url,
                pr_number: request.pr_number,
                credential: request.credential,
                diff_blob,
            })
            .await?;

        // Link before publishing so the worker always finds the record.
        let queue_task_id = QueueTaskId::generate();
        let record = self.store.set_queue_task_id(&record, &queue_task_id).await?;

        let submitted = self
            .queue
            .submit(ReviewJob {
                queue_task_id: queue_task_id.clone(),
                diff_blob: record.diff_blob.clone(),
            })
            .await;
        let task_id = match submitted {
            Ok(task_id) => task_id,
            Err(e) => {
                tracing::error!(record_id = record.id, task_id = %queue_task_id, error = %e, "enqueue failed");
                self.abandon(&record).await;
                return Err(e);
            }
        };
        tracing::info!(record_id = record.id, task_id = %task_id, "review accepted");

        Ok(AnalyzeResponse {
            task_id,
            status: record.status,
        })
    }

    /// Marks a linked record whose job never reached the queue as failed, so
    /// polling clients do not wait on it forever.
    async fn abandon(&self, record: &TaskRecord) {
        let result = match self.store.ensure_started(record).await {
            Ok(record) => self.store.advance(&record, LifecycleEvent::Failed).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(record_id = record.id, error = %e, "could not mark unqueued task as failed");
        }
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskStatusResponse, ReviewError> {
        self.status.query(task_id).await
    }

    pub async fn results(&self, task_id: &str) -> Result<TaskResultsResponse, ReviewError> {
        let id = QueueTaskId::from(task_id);
        let record = self.store.find_by_queue_task_id(&id).await?;
        Ok(TaskResultsResponse {
            task_id: id,
            status: record.status,
            results: record.analysis_result.as_ref().map(|a| a.to_value()),
        })
    }
}
