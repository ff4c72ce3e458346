//! Long-running mode: owed runs at startup, then one run per schedule boundary

use crate::ingestion::config::PipelineConfig;
use crate::ingestion::pipeline::run_pipeline;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Drive the pipeline on `config.schedule` until `shutdown` resolves.
///
/// `shutdown` is watched the whole time, including while a run is in flight;
/// a run interrupted that way is abandoned.
pub async fn run_scheduler<S>(client: &Client, config: &PipelineConfig, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    info!("🚀 Starting IPCA scheduler");

    let missed = config
        .schedule
        .missed_runs(config.start_date, Utc::now(), config.catchup);
    if !missed.is_empty() {
        info!("{} run(s) owed since {}", missed.len(), config.start_date);
    }

    let mut last_fire: Option<DateTime<Utc>> = None;
    for fire_time in missed {
        tokio::select! {
            _ = run_logged(client, config, fire_time) => {}
            _ = &mut shutdown => {
                warn!("Interrupted during run for {}, shutting down scheduler", fire_time);
                return;
            }
        }
        last_fire = Some(fire_time);
    }

    loop {
        let now = Utc::now();
        // Never fire the same boundary twice if the wall clock lags the timer
        let next = config
            .schedule
            .next_after(last_fire.map_or(now, |last| last.max(now)));

        if let Some(last) = last_fire {
            let skipped = config.schedule.boundaries_between(last, next);
            if let (Some(first), Some(latest)) = (skipped.first(), skipped.last()) {
                warn!(
                    skipped = skipped.len(),
                    first = %first,
                    last = %latest,
                    "Run for {} overran the schedule; skipping missed boundaries",
                    last
                );
            }
        }

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("Next run at {} (in {:?})", next, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                warn!("Interrupted, shutting down scheduler");
                return;
            }
        }

        tokio::select! {
            _ = run_logged(client, config, next) => {}
            _ = &mut shutdown => {
                warn!("Interrupted during run for {}, shutting down scheduler", next);
                return;
            }
        }
        last_fire = Some(next);
    }
}

/// A failed run is reported and the scheduler moves on to the next interval
async fn run_logged(client: &Client, config: &PipelineConfig, fire_time: DateTime<Utc>) {
    let run_id = fire_time.to_rfc3339();
    info!("Running pipeline for {}", run_id);
    match run_pipeline(client, config).await {
        Ok(stats) => info!("✓ {} completed: {}", run_id, stats),
        Err(e) => error!("✗ {} failed: {:#}", run_id, e),
    }
}
