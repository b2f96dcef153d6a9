use async_trait::async_trait;

use crate::error::ReviewError;
use crate::lifecycle::LifecycleEvent;
use crate::models::{AnalysisResult, NewTaskRecord, QueueTaskId, TaskRecord, TaskStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

/// Durable storage for [`TaskRecord`]s. Status only ever changes through
/// [`TaskStore::advance`].
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, new: NewTaskRecord) -> Result<TaskRecord, ReviewError>;

    /// Links the queue task id. Fails with `Conflict` if the record already
    /// has one or another record owns the id.
    async fn set_queue_task_id(
        &self,
        record: &TaskRecord,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError>;

    async fn find_by_queue_task_id(
        &self,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError>;

    async fn advance(
        &self,
        record: &TaskRecord,
        event: LifecycleEvent,
    ) -> Result<TaskRecord, ReviewError>;

    async fn update_status(
        &self,
        record: &TaskRecord,
        status: TaskStatus,
    ) -> Result<TaskRecord, ReviewError> {
        let event = match status {
            TaskStatus::Pending => LifecycleEvent::Started,
            TaskStatus::Success => LifecycleEvent::Succeeded { analysis: None },
            TaskStatus::Failure => LifecycleEvent::Failed,
            TaskStatus::Unset => {
                return Err(ReviewError::InvalidTransition {
                    from: record.status,
                    to: TaskStatus::Unset,
                })
            }
        };
        self.advance(record, event).await
    }

    /// Moves an `unset` record to `pending`. Terminal writes go through this so
    /// they do not depend on the pre-run hook having been applied.
    async fn ensure_started(&self, record: &TaskRecord) -> Result<TaskRecord, ReviewError> {
        if record.status == TaskStatus::Unset {
            self.advance(record, LifecycleEvent::Started).await
        } else {
            Ok(record.clone())
        }
    }

    /// Stores the analysis and moves the record to `success` in one write.
    async fn set_analysis_result(
        &self,
        record: &TaskRecord,
        payload: AnalysisResult,
    ) -> Result<TaskRecord, ReviewError> {
        self.advance(
            record,
            LifecycleEvent::Succeeded {
                analysis: Some(payload),
            },
        )
        .await
    }
}
