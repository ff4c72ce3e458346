//! Pipeline configuration loaded from environment variables

use crate::ingestion::schedule::Schedule;
use crate::ingestion::types::StorageTarget;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_IBGE_BASE_URL: &str = "https://servicodados.ibge.gov.br";

/// IPCA general index, monthly change (variable 2265 used only as a liveness check)
pub const DEFAULT_READY_ENDPOINT: &str =
    "/api/v3/agregados/7060/periodos/-48/variaveis/2265?localidades=N1[all]|N7[all]&classificacao=315[7169]";
pub const DEFAULT_DATA_ENDPOINT: &str =
    "/api/v3/agregados/7060/periodos/-48/variaveis/63?localidades=N1[all]|N7[all]&classificacao=315[7169]";

/// Everything one pipeline run and the scheduler need
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub owner: String,
    pub ibge_base_url: String,
    pub ready_endpoint: String,
    pub data_endpoint: String,
    pub storage: StorageTarget,
    pub schedule: Schedule,
    pub start_date: NaiveDate,
    pub catchup: bool,
    pub retries: u32,
    pub retry_delay: Duration,
    pub poke_interval: Duration,
    pub sensor_timeout: Duration,
    pub http_timeout: Duration,
    pub output_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(PipelineConfig {
            owner: text("PIPELINE_OWNER", "ipca-pipeline"),
            ibge_base_url: text("IBGE_BASE_URL", DEFAULT_IBGE_BASE_URL),
            ready_endpoint: text("IBGE_READY_ENDPOINT", DEFAULT_READY_ENDPOINT),
            data_endpoint: text("IBGE_DATA_ENDPOINT", DEFAULT_DATA_ENDPOINT),

            storage: StorageTarget {
                endpoint: text("STORAGE_ENDPOINT", "https://s3.amazonaws.com"),
                bucket: text("STORAGE_BUCKET", "ibgeapiairflow"),
                key: text("STORAGE_KEY", "IPCA.csv"),
                token: optional("STORAGE_TOKEN"),
                replace: parse_var(&lookup, "STORAGE_REPLACE", true)?,
            },

            schedule: parse_var(&lookup, "PIPELINE_SCHEDULE", Schedule::Weekly)?,
            start_date: parse_var(
                &lookup,
                "PIPELINE_START_DATE",
                NaiveDate::from_ymd_opt(2024, 4, 14).context("invalid default start date")?,
            )?,
            catchup: parse_var(&lookup, "PIPELINE_CATCHUP", false)?,
            retries: parse_var(&lookup, "PIPELINE_RETRIES", 2)?,
            retry_delay: Duration::from_secs(parse_var(&lookup, "PIPELINE_RETRY_DELAY_SECS", 60)?),
            poke_interval: Duration::from_secs(parse_var(&lookup, "SENSOR_POKE_INTERVAL_SECS", 60)?),
            sensor_timeout: Duration::from_secs(parse_var(
                &lookup,
                "SENSOR_TIMEOUT_SECS",
                7 * 24 * 60 * 60,
            )?),
            http_timeout: Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 300)?), // 5 min
            output_path: optional("OUTPUT_PATH").map(PathBuf::from),
        })
    }

    pub fn ready_url(&self) -> String {
        join_url(&self.ibge_base_url, &self.ready_endpoint)
    }

    pub fn data_url(&self) -> String {
        join_url(&self.ibge_base_url, &self.data_endpoint)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be valid ({:?}): {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
