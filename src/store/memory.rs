use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::TaskStore;
use crate::error::ReviewError;
use crate::lifecycle::{self, LifecycleEvent, Transition};
use crate::models::{NewTaskRecord, QueueTaskId, TaskRecord, TaskStatus};

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, TaskRecord>,
}

/// Mutex-guarded store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.lock().records.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, new: NewTaskRecord) -> Result<TaskRecord, ReviewError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let now = chrono::Utc::now();
        let record = TaskRecord {
            id: inner.next_id,
            repo_url: new.repo_url,
            pr_number: new.pr_number,
            credential: new.credential,
            diff_blob: new.diff_blob,
            queue_task_id: None,
            status: TaskStatus::Unset,
            analysis_result: None,
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_queue_task_id(
        &self,
        record: &TaskRecord,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError> {
        let mut inner = self.lock();
        if inner
            .records
            .values()
            .any(|r| r.queue_task_id.as_ref() == Some(queue_task_id))
        {
            return Err(ReviewError::Conflict(format!(
                "queue task id {} is already linked",
                queue_task_id
            )));
        }

        let stored = inner
            .records
            .get_mut(&record.id)
            .ok_or_else(|| ReviewError::NotFound(format!("task record {}", record.id)))?;
        if stored.queue_task_id.is_some() {
            return Err(ReviewError::Conflict(format!(
                "task record {} already has a queue task id",
                record.id
            )));
        }
        stored.queue_task_id = Some(queue_task_id.clone());
        stored.updated_at = chrono::Utc::now();
        Ok(stored.clone())
    }

    async fn find_by_queue_task_id(
        &self,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError> {
        self.lock()
            .records
            .values()
            .find(|r| r.queue_task_id.as_ref() == Some(queue_task_id))
            .cloned()
            .ok_or_else(|| ReviewError::NotFound(format!("task {}", queue_task_id)))
    }

    async fn advance(
        &self,
        record: &TaskRecord,
        event: LifecycleEvent,
    ) -> Result<TaskRecord, ReviewError> {
        let mut inner = self.lock();
        let stored = inner
            .records
            .get_mut(&record.id)
            .ok_or_else(|| ReviewError::NotFound(format!("task record {}", record.id)))?;

        if let Transition::Apply {
            status,
            analysis_result,
        } = lifecycle::advance(stored.status, event)?
        {
            stored.status = status;
            if analysis_result.is_some() {
                stored.analysis_result = analysis_result;
            }
            stored.updated_at = chrono::Utc::now();
        }
        Ok(stored.clone())
    }
}
