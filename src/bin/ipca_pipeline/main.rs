//! IPCA pipeline runner - fetches IBGE data on a schedule and uploads the tidy CSV

use anyhow::Result;
use ipca_pipeline::ingestion::config::PipelineConfig;
use ipca_pipeline::ingestion::pipeline::run_pipeline;
use ipca_pipeline::ingestion::scheduler::run_scheduler;
use ipca_pipeline::ingestion::utils::http_client;
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG from it is honored
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Load configuration
    let config = PipelineConfig::from_env()?;
    info!(
        "Configuration loaded: schedule {}, start {}, catchup {}, retries {} x {:?}",
        config.schedule, config.start_date, config.catchup, config.retries, config.retry_delay
    );

    let client = http_client(config.http_timeout)?;

    // `once` runs a single pipeline and exits; `serve` (default) keeps the schedule
    let mode = env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    match mode.as_str() {
        "once" => {
            let stats = run_pipeline(&client, &config).await?;
            info!("✓ Pipeline completed: {}", stats);
            Ok(())
        }
        "serve" => {
            run_scheduler(&client, &config, shutdown_signal()).await;
            Ok(())
        }
        other => Err(anyhow::anyhow!(
            "Unknown mode {:?} (expected `once` or `serve`)",
            other
        )),
    }
}

/// Ctrl-c, or never if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
