//! Job curator CLI
//!
//! `run` executes one full cycle and is meant to be triggered by an external
//! scheduler. The other subcommands are operational helpers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curator_core::delivery::TelegramDelivery;
use curator_core::judge::{HeuristicJudge, Prefilter};
use curator_core::render::{EmployerDirectory, PlainRenderer};
use curator_core::run_lock::{database_file, lock_path_for, RunLock};
use curator_core::sources;
use curator_core::{AdmissionQueue, Config, Cycle, SqliteQueueStore, SystemTimeProvider};
use link_resolver::{FetcherExt, HttpFetcher, LinkResolver};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "job-curator")]
#[command(about = "Curates remote job postings into delivery channels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one discovery, resolution and delivery cycle
    Run,

    /// Resolve a single URL and print the result
    Resolve { url: String },

    /// Print queue statistics
    Stats,

    /// Delete expired queue entries
    Expire,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,curator_core=debug,link_resolver=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run => run_cycle(&config).await,
        Commands::Resolve { url } => resolve(&config, &url).await,
        Commands::Stats => stats(&config).await,
        Commands::Expire => expire(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<SqliteQueueStore>> {
    if let Some(parent) = database_file(&config.database_url)
        .as_deref()
        .and_then(|db| db.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let store = SqliteQueueStore::new(&config.database_url)
        .await
        .context("Failed to open queue store")?;
    Ok(Arc::new(store))
}

async fn admission_queue(config: &Config) -> Result<AdmissionQueue> {
    let store = open_store(config).await?;
    Ok(AdmissionQueue::new(store, Arc::new(SystemTimeProvider)).with_ttl(config.queue_ttl()))
}

async fn run_cycle(config: &Config) -> Result<()> {
    let _lock = RunLock::acquire(lock_path_for(&config.database_url))
        .context("Refusing to start a second concurrent run")?;

    let queue = admission_queue(config).await?;

    let resolver_config = config.resolver_config();
    let fetcher = HttpFetcher::new(&resolver_config)
        .context("Failed to build HTTP fetcher")?
        .rate_limited(resolver_config.requests_per_second);
    // same limiter for resolution and reverification
    let liveness = Arc::new(fetcher.clone());
    let resolver = LinkResolver::new(fetcher, resolver_config);

    let directory = match &config.employer_directory {
        Some(path) => EmployerDirectory::load(path)?,
        None => EmployerDirectory::empty(),
    };
    tracing::info!(employers = directory.len(), "Employer directory loaded");

    let token = config
        .telegram_bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN must be set for run")?;
    let delivery = TelegramDelivery::new(token, config.telegram_chats(), config.request_timeout())?;
    for channel in &config.channels {
        if !delivery.has_chat(&channel.name) {
            tracing::warn!(channel = %channel.name, "No chat id configured; deliveries will fail");
        }
    }

    let mut cycle = Cycle::new(
        queue,
        resolver,
        liveness,
        Arc::new(HeuristicJudge::new(Prefilter::default(), config.salary_high_threshold)),
        Arc::new(PlainRenderer::new(Arc::new(directory))),
        Arc::new(delivery),
    )
    .with_settings(config.cycle_settings());
    for name in &config.sources {
        let source = sources::build(name, &config.user_agent, config.request_timeout())?;
        cycle = cycle.with_source(source);
    }
    for channel in config.channels() {
        cycle = cycle.with_channel(channel);
    }

    let stats = cycle.run().await.context("Cycle failed")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn resolve(config: &Config, url: &str) -> Result<()> {
    let resolver_config = config.resolver_config();
    let fetcher = HttpFetcher::new(&resolver_config).context("Failed to build HTTP fetcher")?;
    let resolver = LinkResolver::new(fetcher, resolver_config);

    let resolution = resolver.resolve_with_timeout(url).await;
    println!(
        "{}\t{}",
        resolution.url.as_deref().unwrap_or("-"),
        resolution.reason
    );
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let queue = admission_queue(config).await?;
    let stats = queue.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn expire(config: &Config) -> Result<()> {
    let _lock = RunLock::acquire(lock_path_for(&config.database_url))
        .context("Refusing to expire while a run is in progress")?;

    let queue = admission_queue(config).await?;
    let removed = queue.expire_stale().await?;
    println!("{}", removed);
    Ok(())
}
