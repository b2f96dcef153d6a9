use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReviewError;
use crate::models::QueueTaskId;

pub mod amqp;
pub mod backend;
pub mod local;

pub use amqp::AmqpQueue;
pub use backend::{MemoryResultBackend, PgResultBackend};
pub use local::LocalQueue;

/// Message carried by the queue for one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewJob {
    pub queue_task_id: QueueTaskId,
    pub diff_blob: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveState {
    Pending,
    Started,
    Success,
    Failure,
}

impl LiveState {
    pub fn as_str(self) -> &'static str {
        match self {
            LiveState::Pending => "pending",
            LiveState::Started => "started",
            LiveState::Success => "success",
            LiveState::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(LiveState::Pending),
            "started" => Some(LiveState::Started),
            "success" => Some(LiveState::Success),
            "failure" => Some(LiveState::Failure),
            _ => None,
        }
    }
}

/// The queue's own view of a task, kept apart from the task record.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    pub state: LiveState,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publishes the job under its pre-minted id and returns that id.
    async fn submit(&self, job: ReviewJob) -> Result<QueueTaskId, ReviewError>;

    /// `None` when the queue has never seen the id.
    async fn status(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError>;
}

/// Queue-side bookkeeping of task state and return values.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Records a freshly published job. Never overwrites a state the worker
    /// has already written.
    async fn mark_pending(&self, id: &QueueTaskId) -> Result<(), ReviewError>;
    async fn mark_started(&self, id: &QueueTaskId) -> Result<(), ReviewError>;
    async fn store_success(&self, id: &QueueTaskId, result: &Value) -> Result<(), ReviewError>;
    async fn store_failure(&self, id: &QueueTaskId, error: &str) -> Result<(), ReviewError>;
    async fn fetch(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError>;
}
