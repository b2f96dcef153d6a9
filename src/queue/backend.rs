use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::{LiveState, LiveStatus, ResultBackend};
use crate::error::ReviewError;
use crate::models::QueueTaskId;

#[derive(Default)]
pub struct MemoryResultBackend {
    states: Mutex<HashMap<QueueTaskId, LiveStatus>>,
}

impl MemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, id: &QueueTaskId, status: LiveStatus) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), status);
    }
}

#[async_trait]
impl ResultBackend for MemoryResultBackend {
    async fn mark_pending(&self, id: &QueueTaskId) -> Result<(), ReviewError> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.clone())
            .or_insert(LiveStatus {
                state: LiveState::Pending,
                result: None,
                error: None,
            });
        Ok(())
    }

    async fn mark_started(&self, id: &QueueTaskId) -> Result<(), ReviewError> {
        self.put(id, LiveStatus {
            state: LiveState::Started,
            result: None,
            error: None,
        });
        Ok(())
    }

    async fn store_success(&self, id: &QueueTaskId, result: &Value) -> Result<(), ReviewError> {
        self.put(id, LiveStatus {
            state: LiveState::Success,
            result: Some(result.clone()),
            error: None,
        });
        Ok(())
    }

    async fn store_failure(&self, id: &QueueTaskId, error: &str) -> Result<(), ReviewError> {
        self.put(id, LiveStatus {
            state: LiveState::Failure,
            result: None,
            error: Some(error.to_string()),
        });
        Ok(())
    }

    async fn fetch(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError> {
        Ok(self
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    state: String,
    result: Option<String>,
    error: Option<String>,
}

pub struct PgResultBackend {
    pool: PgPool,
}

impl PgResultBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert(
        &self,
        id: &QueueTaskId,
        state: LiveState,
        result: Option<String>,
        error: Option<&str>,
    ) -> Result<(), ReviewError> {
        sqlx::query(
            "INSERT INTO queue_task_results(queue_task_id, state, result, error) VALUES($1, $2, $3, $4)
             ON CONFLICT(queue_task_id) DO UPDATE SET state=$2, result=$3, error=$4, updated_at=now()",
        )
        .bind(id.as_str())
        .bind(state.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ResultBackend for PgResultBackend {
    async fn mark_pending(&self, id: &QueueTaskId) -> Result<(), ReviewError> {
        sqlx::query(
            "INSERT INTO queue_task_results(queue_task_id, state) VALUES($1, $2)
             ON CONFLICT(queue_task_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(LiveState::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_started(&self, id: &QueueTaskId) -> Result<(), ReviewError> {
        self.upsert(id, LiveState::Started, None, None).await
    }

    async fn store_success(&self, id: &QueueTaskId, result: &Value) -> Result<(), ReviewError> {
        self.upsert(id, LiveState::Success, Some(result.to_string()), None)
            .await
    }

    async fn store_failure(&self, id: &QueueTaskId, error: &str) -> Result<(), ReviewError> {
        self.upsert(id, LiveState::Failure, None, Some(error)).await
    }

    async fn fetch(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError> {
        let row = sqlx::query_as::<_, ResultRow>(
            "SELECT state, result, error FROM queue_task_results WHERE queue_task_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let state = LiveState::parse(&row.state).ok_or_else(|| {
            ReviewError::Queue(format!("unknown live state {} for {}", row.state, id))
        })?;
        let result = row
            .result
            .map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)));

        Ok(Some(LiveStatus {
            state,
            result,
            error: row.error,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn late_pending_mark_keeps_the_worker_state() {
        let backend = MemoryResultBackend::new();
        let id = QueueTaskId::from("fast");
        backend.store_success(&id, &json!({"bugs": []})).await.unwrap();

        backend.mark_pending(&id).await.unwrap();

        let live = backend.fetch(&id).await.unwrap().unwrap();
        assert_eq!(live.state, LiveState::Success);
        assert_eq!(live.result, Some(json!({"bugs": []})));
    }
}
