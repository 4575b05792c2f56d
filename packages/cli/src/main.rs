mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::NewSubmission;
use common::storage::RedisStore;
use mq::{Intake, IntakeError, RedisQueue, SubmissionView};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Redis URL (overrides configuration)
    #[arg(long, env = "CODEBOX_REDIS_URL")]
    redis_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a submission and enqueue it for execution
    Submit {
        /// Language identifier, e.g. python
        #[arg(long, short)]
        language: String,
        /// Source file to submit
        file: PathBuf,
        /// File whose contents are passed to stdin
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Wall-clock limit in milliseconds
        #[arg(long, default_value_t = 2000)]
        time_limit_ms: u64,
        /// Memory limit in megabytes
        #[arg(long, default_value_t = 128)]
        memory_limit_mb: u64,
        /// Poll until a result is available
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        wait_timeout_secs: u64,
    },
    /// Show the result, or the current status, of a submission
    Status {
        /// Submission id returned by `submit`
        id: String,
    },
    /// Show the queue backlog
    Stats,
}

#[derive(Serialize)]
struct Stats<'a> {
    queue_name: &'a str,
    backlog: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}

async fn wait_for_result(intake: &Intake, id: &str, timeout: Duration) -> Result<SubmissionView> {
    let deadline = Instant::now() + timeout;
    let mut delay = Duration::from_millis(100);

    loop {
        let view = intake.query(id).await?;
        if matches!(view, SubmissionView::Completed(_)) {
            return Ok(view);
        }
        if Instant::now() >= deadline {
            bail!("no result for {id} after {}s (status: {})", timeout.as_secs(), view.status());
        }
        debug!(status = %view.status(), delay_ms = delay.as_millis() as u64, "Waiting for result");
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(2));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = CliConfig::load().context("Failed to load config")?;
    if let Some(url) = cli.redis_url {
        config.redis.url = url;
    }

    let client = config.redis.client().context("Invalid Redis URL")?;
    let store = RedisStore::connect(&client)
        .await
        .context("Failed to connect to Redis")?;
    let queue = RedisQueue::connect(&client, config.redis.queue_name.clone())
        .await
        .context("Failed to connect to Redis")?;
    let intake = Intake::new(Arc::new(store), Arc::new(queue));

    match cli.command {
        Commands::Submit {
            language,
            file,
            input_file,
            time_limit_ms,
            memory_limit_mb,
            wait,
            wait_timeout_secs,
        } => {
            let code = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let input = match input_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => String::new(),
            };

            let ticket = intake
                .submit(NewSubmission {
                    language,
                    code,
                    input,
                    time_limit_ms,
                    memory_limit_mb,
                })
                .await?;

            if wait {
                let view =
                    wait_for_result(&intake, &ticket.id, Duration::from_secs(wait_timeout_secs))
                        .await?;
                print_json(&view)?;
            } else {
                print_json(&ticket)?;
            }
        }
        Commands::Status { id } => match intake.query(&id).await {
            Ok(view) => print_json(&view)?,
            Err(IntakeError::NotFound(id)) => bail!("submission {id} not found"),
            Err(e) => return Err(e.into()),
        },
        Commands::Stats => {
            print_json(&Stats {
                queue_name: &config.redis.queue_name,
                backlog: intake.backlog().await?,
            })?;
        }
    }

    Ok(())
}
