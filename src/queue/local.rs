use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use super::{LiveStatus, ResultBackend, ReviewJob, TaskQueue};
use crate::error::ReviewError;
use crate::models::QueueTaskId;
use crate::worker::Runner;

/// In-process queue: jobs go over a channel to a pool of tokio tasks running
/// the same [`Runner`] the AMQP worker uses.
pub struct LocalQueue {
    sender: mpsc::UnboundedSender<ReviewJob>,
    backend: Arc<dyn ResultBackend>,
}

impl LocalQueue {
    pub fn start(runner: Arc<Runner>, backend: Arc<dyn ResultBackend>, concurrency: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ReviewJob>();
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner.execute(job).await;
                    drop(permit);
                });
            }
            tracing::info!("local queue closed");
        });

        Self { sender, backend }
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn submit(&self, job: ReviewJob) -> Result<QueueTaskId, ReviewError> {
        let id = job.queue_task_id.clone();
        self.sender
            .send(job)
            .map_err(|_| ReviewError::Queue("local worker pool has stopped".into()))?;
        if let Err(e) = self.backend.mark_pending(&id).await {
            tracing::error!(task_id = %id, error = %e, "could not record pending state");
        }
        Ok(id)
    }

    async fn status(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError> {
        self.backend.fetch(id).await
    }
}
