use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_lite::stream::StreamExt;
use lapin::{options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties};

use super::{LiveStatus, ResultBackend, ReviewJob, TaskQueue};
use crate::config::AmqpConfig;
use crate::error::ReviewError;
use crate::models::QueueTaskId;
use crate::worker::Runner;

async fn open_channel(config: &AmqpConfig) -> Result<(Connection, Channel), lapin::Error> {
    let conn = Connection::connect(&config.addr, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok((conn, channel))
}

/// Publishes review jobs to an AMQP queue.
pub struct AmqpQueue {
    _conn: Connection,
    channel: Channel,
    queue: String,
    backend: Arc<dyn ResultBackend>,
}

impl AmqpQueue {
    pub async fn connect(
        config: &AmqpConfig,
        backend: Arc<dyn ResultBackend>,
    ) -> Result<Self, ReviewError> {
        let (conn, channel) = open_channel(config).await?;
        tracing::info!(queue = %config.queue, "publisher connected");
        Ok(Self {
            _conn: conn,
            channel,
            queue: config.queue.clone(),
            backend,
        })
    }
}

#[async_trait]
impl TaskQueue for AmqpQueue {
    async fn submit(&self, job: ReviewJob) -> Result<QueueTaskId, ReviewError> {
        let payload = serde_json::to_vec(&job).map_err(|e| ReviewError::Queue(e.to_string()))?;

        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2)
                    .with_message_id(job.queue_task_id.as_str().into()),
            )
            .await?
            .await?;

        if let Err(e) = self.backend.mark_pending(&job.queue_task_id).await {
            tracing::error!(task_id = %job.queue_task_id, error = %e, "could not record pending state");
        }
        tracing::info!(task_id = %job.queue_task_id, "review task enqueued");
        Ok(job.queue_task_id)
    }

    async fn status(&self, id: &QueueTaskId) -> Result<Option<LiveStatus>, ReviewError> {
        self.backend.fetch(id).await
    }
}

/// Consumes review jobs until the connection drops. Each delivery is acked
/// once its task and hooks have finished.
pub async fn start_worker(config: AmqpConfig, runner: Arc<Runner>) -> Result<()> {
    let (_conn, channel) = open_channel(&config).await?;
    channel
        .basic_qos(config.concurrency, BasicQosOptions::default())
        .await?;

    tracing::info!(queue = %config.queue, concurrency = config.concurrency, "worker connected");

    let mut consumer = channel
        .basic_consume(
            &config.queue,
            "reviewbot-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let runner = runner.clone();
        tokio::spawn(async move {
            match serde_json::from_slice::<ReviewJob>(&delivery.data) {
                Ok(job) => runner.execute(job).await,
                Err(e) => tracing::error!("Dropping undecodable review job: {}", e),
            }
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                tracing::error!("Error while acking message {}.", e);
            }
        });
    }

    Ok(())
}
