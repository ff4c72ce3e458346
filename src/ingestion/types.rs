//! Core data types for the ingestion pipeline
//! Pure data structures with no behavior

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw data from the source API - tagged union
#[derive(Debug)]
pub enum RawData {
    Json(serde_json::Value),
    Csv(String),
}

impl RawData {
    pub fn as_json(&self) -> anyhow::Result<&serde_json::Value> {
        match self {
            RawData::Json(json) => Ok(json),
            _ => Err(anyhow::anyhow!("Expected Json, got {:?}", self)),
        }
    }

    pub fn as_csv(&self) -> anyhow::Result<&str> {
        match self {
            RawData::Csv(text) => Ok(text),
            _ => Err(anyhow::anyhow!("Expected Csv, got {:?}", self)),
        }
    }
}

/// Errors raised while turning an API document into tidy rows.
/// Any of these aborts the transform with no partial output.
#[derive(Debug, Error)]
pub enum ReshapeError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid period label {label:?} (expected YYYYMM)")]
    InvalidPeriod { label: String },

    #[error("non-numeric value {value:?} for {region} at {period}")]
    NonNumericValue {
        region: String,
        period: Period,
        value: String,
    },
}

/// Upload failures that another attempt cannot fix
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("object {url} already exists and replace is disabled")]
    AlreadyExists { url: String },
}

/// Reference month of an observation, parsed from a `YYYYMM` label.
/// Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: u16,
    pub month: u8,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Period { year, month })
    }

    /// `MM/YYYY`, the form written to the CSV
    pub fn to_display_date(&self) -> String {
        format!("{:02}/{:04}", self.month, self.year)
    }
}

impl FromStr for Period {
    type Err = ReshapeError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || ReshapeError::InvalidPeriod {
            label: label.to_string(),
        };

        if label.len() != 6 || !label.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year = label[..4].parse::<u16>().map_err(|_| invalid())?;
        let month = label[4..].parse::<u8>().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}

/// Source label form
impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// One region's time series as published by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSeries {
    pub name: String,
    pub values: BTreeMap<Period, String>,
}

/// Ordered batch of region series from a single API response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesCollection {
    pub regions: Vec<RegionSeries>,
}

impl SeriesCollection {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Union of every region's periods, oldest first
    pub fn periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self
            .regions
            .iter()
            .flat_map(|region| region.values.keys().copied())
            .collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

/// Output row - one observation per (date, region)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TidyRow {
    pub date: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "IPCA")]
    pub value: String,
}

/// Where the CSV is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
    pub token: Option<String>,
    /// Overwrite an existing object instead of failing
    pub replace: bool,
}

impl StorageTarget {
    pub fn object_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket.trim_matches('/'),
            self.key.trim_start_matches('/')
        )
    }
}

/// Pipeline run statistics
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub regions: usize,
    pub periods: usize,
    pub rows: usize,
    pub bytes_uploaded: usize,
    pub object_key: String,
    pub sensor_attempts: u32,
    pub fetch_attempts: u32,
    pub upload_attempts: u32,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regions: {}, periods: {}, rows: {}, uploaded: {} bytes to {} (attempts: sensor {}, fetch {}, upload {})",
            self.regions,
            self.periods,
            self.rows,
            self.bytes_uploaded,
            self.object_key,
            self.sensor_attempts,
            self.fetch_attempts,
            self.upload_attempts
        )
    }
}
