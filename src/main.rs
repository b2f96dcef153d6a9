use std::sync::Arc;

use anyhow::{Context, Result};
use poem::{listener::TcpListener, Server};

use reviewbot::config::{AmqpConfig, Config};
use reviewbot::github::DiffFetcher;
use reviewbot::hooks::LifecycleHooks;
use reviewbot::inference::GeminiClient;
use reviewbot::queue::{self, AmqpQueue, PgResultBackend, ResultBackend};
use reviewbot::review::ReviewTask;
use reviewbot::service::ReviewService;
use reviewbot::store::{PgTaskStore, TaskStore};
use reviewbot::worker::Runner;
use reviewbot::{db, views};

fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();
}

fn setup_worker(config: AmqpConfig, runner: Arc<Runner>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = queue::amqp::start_worker(config.clone(), runner.clone()).await {
                tracing::error!("Worker connection lost: {:?}", e);
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url, 10).await?;
    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
    let backend: Arc<dyn ResultBackend> = Arc::new(PgResultBackend::new(pool));

    if config.role.runs_worker() {
        let gemini = config
            .gemini
            .as_ref()
            .context("worker role needs Gemini settings")?;
        let inference = Arc::new(GeminiClient::new(gemini)?);
        let runner = Arc::new(Runner::new(
            ReviewTask::new(inference, store.clone()),
            Arc::new(LifecycleHooks::new(store.clone())),
            backend.clone(),
        ));
        setup_worker(config.amqp.clone(), runner);
    }

    if !config.role.runs_web() {
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let queue = Arc::new(AmqpQueue::connect(&config.amqp, backend).await?);
    let service = Arc::new(ReviewService::new(
        DiffFetcher::new(config.github_api_url.clone())?,
        store,
        queue,
    ));

    tracing::info!(addr = %config.listen_addr, "listening");
    Server::new(TcpListener::bind(config.listen_addr.as_str()))
        .run(views::app(service))
        .await?;

    Ok(())
}
