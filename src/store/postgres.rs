use async_trait::async_trait;
use sqlx::PgPool;

use super::TaskStore;
use crate::error::ReviewError;
use crate::lifecycle::{self, LifecycleEvent, Transition};
use crate::models::{AnalysisResult, Credential, NewTaskRecord, QueueTaskId, TaskRecord, TaskStatus};

const UNIQUE_VIOLATION: &str = "23505";
const MAX_ADVANCE_ATTEMPTS: usize = 4;

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    repo_url: String,
    pr_number: i64,
    credential: String,
    diff_blob: String,
    queue_task_id: Option<String>,
    status: Option<String>,
    analysis_result: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = ReviewError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_db_str(row.status.as_deref()).ok_or_else(|| {
            ReviewError::Conflict(format!(
                "task record {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;

        let pr_number = u64::try_from(row.pr_number).map_err(|_| {
            ReviewError::Conflict(format!(
                "task record {} has invalid pull request number {}",
                row.id, row.pr_number
            ))
        })?;

        Ok(TaskRecord {
            id: row.id,
            repo_url: row.repo_url,
            pr_number,
            credential: Credential::new(row.credential),
            diff_blob: row.diff_blob,
            queue_task_id: row.queue_task_id.map(QueueTaskId::from),
            status,
            analysis_result: row.analysis_result.map(AnalysisResult::from_stored),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: i64) -> Result<TaskRecord, ReviewError> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM review_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("task record {}", id)))?
            .try_into()
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, new: NewTaskRecord) -> Result<TaskRecord, ReviewError> {
        let pr_number = i64::try_from(new.pr_number)
            .map_err(|_| ReviewError::Validation("pull request number is too large".into()))?;

        sqlx::query_as::<_, TaskRow>(
            "INSERT INTO review_tasks(repo_url, pr_number, credential, diff_blob)
             VALUES($1, $2, $3, $4) RETURNING *",
        )
        .bind(&new.repo_url)
        .bind(pr_number)
        .bind(new.credential.expose())
        .bind(&new.diff_blob)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn set_queue_task_id(
        &self,
        record: &TaskRecord,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError> {
        let updated = sqlx::query_as::<_, TaskRow>(
            "UPDATE review_tasks SET queue_task_id = $1, updated_at = now()
             WHERE id = $2 AND queue_task_id IS NULL RETURNING *",
        )
        .bind(queue_task_id.as_str())
        .bind(record.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ReviewError::Conflict(format!("queue task id {} is already linked", queue_task_id))
            } else {
                e.into()
            }
        })?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                // Either the row is gone or it was already linked.
                self.fetch(record.id).await?;
                Err(ReviewError::Conflict(format!(
                    "task record {} already has a queue task id",
                    record.id
                )))
            }
        }
    }

    async fn find_by_queue_task_id(
        &self,
        queue_task_id: &QueueTaskId,
    ) -> Result<TaskRecord, ReviewError> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM review_tasks WHERE queue_task_id = $1")
            .bind(queue_task_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("task {}", queue_task_id)))?
            .try_into()
    }

    async fn advance(
        &self,
        record: &TaskRecord,
        event: LifecycleEvent,
    ) -> Result<TaskRecord, ReviewError> {
        let mut current = self.fetch(record.id).await?;

        for _ in 0..MAX_ADVANCE_ATTEMPTS {
            let (status, analysis_result) = match lifecycle::advance(current.status, event.clone())? {
                Transition::Unchanged => return Ok(current),
                Transition::Apply {
                    status,
                    analysis_result,
                } => (status, analysis_result),
            };

            // Compare-and-set on the status we computed the transition from.
            let updated = sqlx::query_as::<_, TaskRow>(
                "UPDATE review_tasks
                 SET status = $1, analysis_result = COALESCE($2, analysis_result), updated_at = now()
                 WHERE id = $3 AND status IS NOT DISTINCT FROM $4
                 RETURNING *",
            )
            .bind(status.as_db_str())
            .bind(analysis_result.as_ref().map(AnalysisResult::to_stored))
            .bind(current.id)
            .bind(current.status.as_db_str())
            .fetch_optional(&self.pool)
            .await?;

            match updated {
                Some(row) => return row.try_into(),
                None => current = self.fetch(current.id).await?,
            }
        }

        Err(ReviewError::Conflict(format!(
            "task record {} kept changing while moving to {}",
            record.id,
            event.target()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pr_number: i64, status: Option<&str>) -> TaskRow {
        let now = chrono::Utc::now();
        TaskRow {
            id: 9,
            repo_url: "https://github.com/octo/hello".into(),
            pr_number,
            credential: "t".into(),
            diff_blob: "diff".into(),
            queue_task_id: Some("q".into()),
            status: status.map(str::to_string),
            analysis_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn null_status_decodes_as_unset() {
        let record = TaskRecord::try_from(row(3, None)).unwrap();
        assert_eq!(record.status, TaskStatus::Unset);
        assert_eq!(record.pr_number, 3);
    }

    #[test]
    fn negative_pr_number_is_rejected() {
        let err = TaskRecord::try_from(row(-1, Some("pending"))).unwrap_err();
        assert!(matches!(err, ReviewError::Conflict(_)));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = TaskRecord::try_from(row(3, Some("running"))).unwrap_err();
        assert!(matches!(err, ReviewError::Conflict(_)));
    }
}
