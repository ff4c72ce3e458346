//! Utility functions for common operations

use crate::ingestion::types::UploadError;
use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Build the shared HTTP client
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// GET a URL and decode the body as JSON
pub async fn http_get_json(client: &Client, url: &str) -> Result<serde_json::Value> {
    info!("Downloading from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?;
    let status = response.status();

    if !status.is_success() {
        return Err(anyhow::anyhow!("HTTP request failed: {} ({})", status, url));
    }

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Reading body from {}", url))?;
    info!("Downloaded {} bytes", bytes.len());

    serde_json::from_slice(&bytes).with_context(|| format!("Response from {} is not JSON", url))
}

/// Run `op` until it succeeds, retrying up to `retries` more times with a
/// fixed `delay` in between. Returns the value and the number of attempts used.
/// Permanent failures (see `is_permanent`) are returned without retrying.
pub async fn with_retries<T, F, Fut>(
    step: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) if attempts <= retries && !is_permanent(&e) => {
                warn!(
                    step,
                    attempt = attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %e,
                    "Step failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if is_permanent(&e) => {
                error!(step, attempts, error = %e, "Step failed, not retryable");
                return Err(e.context(format!("{} failed after {} attempts", step, attempts)));
            }
            Err(e) => {
                error!(step, attempts, error = %e, "Exhausted retries");
                return Err(e.context(format!("{} failed after {} attempts", step, attempts)));
            }
        }
    }
}

/// Errors no later attempt can fix
fn is_permanent(e: &anyhow::Error) -> bool {
    e.downcast_ref::<UploadError>().is_some()
}
