//! One pipeline run: sensor -> fetch -> transform -> upload
//!
//! Network steps are retried per `PipelineConfig::retries`; the transform is
//! pure and runs exactly once.

use crate::ingestion::config::PipelineConfig;
use crate::ingestion::types::RunStats;
use crate::ingestion::utils::with_retries;
use crate::ingestion::{fetch, parse, reshape, write};
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, instrument};

#[instrument(skip_all, fields(owner = %config.owner))]
pub async fn run_pipeline(client: &Client, config: &PipelineConfig) -> Result<RunStats> {
    info!("=== IPCA Pipeline ===");

    // Step 1: Wait for the API
    info!("Step 1/4: Checking IBGE API readiness...");
    let ready_url = config.ready_url();
    let (_, sensor_attempts) = with_retries("readiness check", config.retries, config.retry_delay, || {
        fetch::wait_until_ready(client, &ready_url, config.poke_interval, config.sensor_timeout)
    })
    .await?;
    info!("✓ API ready");

    // Step 2: Fetch raw data
    info!("Step 2/4: Fetching data...");
    let data_url = config.data_url();
    let (raw, fetch_attempts) = with_retries("fetch", config.retries, config.retry_delay, || {
        fetch::fetch_series(client, &data_url)
    })
    .await?;
    info!("✓ Fetch complete");

    // Step 3: Reshape into tidy CSV
    info!("Step 3/4: Transforming data...");
    let collection = parse::parse_series(&raw).context("Failed to parse IBGE response")?;
    let rows = reshape::reshape(&collection).context("Failed to reshape IPCA series")?;
    let csv = write::render_csv(&rows)?;
    info!("✓ Transformed {} rows", rows.len());

    if let Some(path) = &config.output_path {
        write::write_local_copy(&csv, path)?;
    }

    // Step 4: Upload
    info!("Step 4/4: Uploading to object storage...");
    let (bytes_uploaded, upload_attempts) = with_retries("upload", config.retries, config.retry_delay, || {
        write::upload_object(client, &config.storage, &csv)
    })
    .await?;
    info!("✓ Upload complete");

    Ok(RunStats {
        regions: collection.regions.len(),
        periods: collection.periods().len(),
        rows: rows.len(),
        bytes_uploaded,
        object_key: config.storage.key.clone(),
        sensor_attempts,
        fetch_attempts,
        upload_attempts,
    })
}
