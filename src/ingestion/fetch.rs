//! Fetch functions - check the IBGE API is up and retrieve the raw aggregate

use crate::ingestion::types::RawData;
use crate::ingestion::utils::http_get_json;
use anyhow::Result;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Poke `url` until it answers with a 2xx status.
///
/// Connection errors and non-success statuses count as "not ready yet"; the
/// sensor only fails once `timeout` has elapsed. Returns the number of pokes.
pub async fn wait_until_ready(
    client: &Client,
    url: &str,
    poke_interval: Duration,
    timeout: Duration,
) -> Result<u32> {
    info!("Waiting for {} to become ready", url);
    let started = Instant::now();
    let mut pokes = 0;

    loop {
        pokes += 1;
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("API ready after {} poke(s)", pokes);
                return Ok(pokes);
            }
            Ok(response) => debug!("Poke {}: {} returned {}", pokes, url, response.status()),
            Err(e) => debug!("Poke {}: {} unreachable: {}", pokes, url, e),
        }

        if started.elapsed().saturating_add(poke_interval) > timeout {
            return Err(anyhow::anyhow!(
                "{} not ready after {:?} ({} pokes)",
                url,
                started.elapsed(),
                pokes
            ));
        }

        tokio::time::sleep(poke_interval).await;
    }
}

/// Fetch the IPCA aggregate as JSON
pub async fn fetch_series(client: &Client, url: &str) -> Result<RawData> {
    info!("Fetching IPCA series from {}", url);

    let json = http_get_json(client, url).await?;

    Ok(RawData::Json(json))
}
