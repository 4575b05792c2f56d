use std::sync::Arc;

use anyhow::Context;
use common::storage::RedisStore;
use mq::RedisQueue;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker::models::sandbox::{DockerRuntime, ProcessRuntime, SandboxRuntime};
use worker::{
    ExecutorSettings, Health, JobContext, RunnerRegistry, RuntimeKind, SandboxExecutor,
    WorkerAppConfig, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    std::panic::set_hook(Box::new(|info| {
        error!(panic = %info, "Panic in worker");
    }));

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!(
        worker_id = %config.worker.id,
        concurrency = config.worker.concurrency,
        runtime = ?config.sandbox.runtime,
        "Worker starting"
    );

    let client = config.redis.client().context("Invalid Redis URL")?;
    let store = Arc::new(
        RedisStore::connect(&client)
            .await
            .context("Failed to connect metadata store")?,
    );

    let runtime: Arc<dyn SandboxRuntime> = match config.sandbox.runtime {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new(&config.sandbox)),
        RuntimeKind::Process => Arc::new(ProcessRuntime::new(config.sandbox.mount_point.clone())),
    };
    let registry = RunnerRegistry::from_settings(&config.languages);
    info!(languages = ?registry.languages(), "Runners registered");

    let ctx = Arc::new(JobContext {
        store,
        registry: Arc::new(registry),
        executor: Arc::new(SandboxExecutor::new(
            runtime,
            ExecutorSettings::from(&config.sandbox),
        )),
        retry: config.worker.retry,
    });

    let shutdown = CancellationToken::new();
    let health = Health::new();
    let tracker = TaskTracker::new();

    for n in 0..config.worker.concurrency.max(1) {
        // A blocking pop holds its connection, so every loop gets its own.
        let queue = RedisQueue::connect(&client, config.redis.queue_name.clone())
            .await
            .context("Failed to connect job queue")?;
        let worker = Worker::new(
            format!("{}/{n}", config.worker.id),
            Arc::new(queue),
            ctx.clone(),
            config.worker.clone(),
            health.clone(),
        );
        let shutdown = shutdown.clone();
        tracker.spawn(async move { worker.run(shutdown).await });
    }
    tracker.close();

    info!(queue_name = %config.redis.queue_name, "Waiting for submissions");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, finishing in-flight jobs");
        }
        _ = tracker.wait() => {
            error!("All worker loops exited");
        }
    }

    shutdown.cancel();
    tracker.wait().await;
    info!(healthy = health.is_healthy(), "Worker stopped");

    Ok(())
}
