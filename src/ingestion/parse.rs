//! Parse functions - turn the raw IBGE aggregate response into a SeriesCollection

use crate::ingestion::types::{Period, RawData, RegionSeries, ReshapeError, SeriesCollection};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One variable of an aggregate query (the API returns a list of these)
#[derive(Debug, Deserialize)]
struct VariableRow {
    #[serde(rename = "resultados", alias = "results")]
    results: Vec<ResultRow>,
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    series: Vec<SeriesRow>,
}

#[derive(Debug, Deserialize)]
struct SeriesRow {
    #[serde(rename = "localidade", alias = "location")]
    location: LocationRow,

    /// Period label (YYYYMM) -> value as text, e.g. "0.16"
    #[serde(rename = "serie", alias = "series")]
    values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    #[serde(rename = "nome", alias = "name")]
    name: String,
}

/// Parse the fetched JSON document into region series.
///
/// Accepts either the API's top-level array (first variable is used) or a
/// bare variable object. Only the first entry of `resultados` is read.
pub fn parse_series(raw: &RawData) -> Result<SeriesCollection, ReshapeError> {
    let json = raw
        .as_json()
        .map_err(|e| ReshapeError::MalformedInput(e.to_string()))?;

    let variable = match json {
        Value::Array(items) => items.first().ok_or_else(|| {
            ReshapeError::MalformedInput("response contains no variables".to_string())
        })?,
        other => other,
    };

    let variable = VariableRow::deserialize(variable)
        .map_err(|e| ReshapeError::MalformedInput(format!("unexpected document shape: {}", e)))?;

    let result = variable.results.into_iter().next().ok_or_else(|| {
        ReshapeError::MalformedInput("variable has no entries in `resultados`".to_string())
    })?;

    let regions = result
        .series
        .into_iter()
        .map(parse_region)
        .collect::<Result<Vec<_>, _>>()?;

    info!("Parsed {} region series", regions.len());

    Ok(SeriesCollection { regions })
}

fn parse_region(row: SeriesRow) -> Result<RegionSeries, ReshapeError> {
    let values = row
        .values
        .into_iter()
        .map(|(label, value)| Ok::<_, ReshapeError>((label.parse::<Period>()?, value)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    debug!("Region {} has {} periods", row.location.name, values.len());

    Ok(RegionSeries {
        name: row.location.name,
        values,
    })
}
