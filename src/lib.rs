// Library module for testable functions

pub mod ingestion;

use ingestion::{parse, reshape, write, RawData};

/// Turn an IBGE aggregate response into the `date;Location;IPCA` CSV text.
/// No I/O; the whole document is rejected if any part of it is malformed.
pub fn ipca_csv_from_json(document: serde_json::Value) -> anyhow::Result<String> {
    let collection = parse::parse_series(&RawData::Json(document))?;
    let rows = reshape::reshape(&collection)?;
    let csv = write::render_csv(&rows)?;
    Ok(csv.as_csv()?.to_string())
}
