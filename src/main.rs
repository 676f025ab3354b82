use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod db;
mod error;
mod models;
mod pipeline;
mod services;

use db::Repository;
use error::Result;
use pipeline::Pipeline;
use services::{Assembler, FfmpegAssembler, ScriptGenerator, TelegramClient, TrendSourceClient};

/// Cadence of the stats heartbeat written to the log.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --db <path> overrides the default data-dir database
    let db_path = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let repository = Arc::new(Repository::new(&db_path.to_string_lossy()).await?);

    // --stats prints the dashboard counts and exits
    if args.iter().any(|a| a == "--stats") {
        let stats = repository.get_stats().await?;
        println!("Trends discovered: {}", stats.total_trends);
        println!("Jobs pending:      {}", stats.pending_jobs);
        println!("Jobs completed:    {}", stats.completed_jobs);
        println!("Jobs failed:       {}", stats.failed_jobs);
        return Ok(());
    }

    let start_paused = args.iter().any(|a| a == "--paused");

    let shorts_dir = db_path
        .parent()
        .map(|p| p.join("shorts"))
        .unwrap_or_else(|| PathBuf::from("shorts"));
    let assembler: Arc<dyn Assembler> = Arc::new(FfmpegAssembler::new(shorts_dir));

    let pipeline = Pipeline::spawn(repository, assembler, start_paused);
    tracing::info!(
        "Pipeline started{} (db: {})",
        if start_paused { " paused" } else { "" },
        db_path.display()
    );

    // Probe configured credentials once at startup so a misconfigured
    // unattended run shows up in the log instead of idling silently.
    let config = pipeline.get_config().await?;
    match &config.youtube_api_key {
        None => tracing::warn!("Trend source API key not configured; the collector will idle"),
        Some(key) => {
            if !TrendSourceClient::test_api_key(key).await {
                tracing::warn!("Trend source API key failed its probe");
            }
        }
    }
    if !ScriptGenerator::test_endpoint(&config.ollama_endpoint).await {
        tracing::warn!(
            "Inference endpoint {} is unreachable",
            config.ollama_endpoint
        );
    }
    if let Some(token) = &config.telegram_bot_token {
        if !TelegramClient::test_bot_token(token).await {
            tracing::warn!("Messaging bot token failed its probe");
        }
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = heartbeat.tick() => {
                match pipeline.get_stats().await {
                    Ok(stats) => tracing::info!(
                        "Stats: {} trends, {} pending, {} completed, {} failed (running: {})",
                        stats.total_trends,
                        stats.pending_jobs,
                        stats.completed_jobs,
                        stats.failed_jobs,
                        pipeline.is_running(),
                    ),
                    Err(e) => tracing::warn!("Failed to read stats: {}", e),
                }
            }
        }
    }

    tracing::info!("Shutting down; in-flight stages will finish");
    pipeline.set_running(false);
    pipeline.shutdown().await;

    Ok(())
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shotauto")
        .join("shotauto.db")
}
