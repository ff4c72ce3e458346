//! Write functions - render tidy rows as CSV and deliver them to object storage

use crate::ingestion::types::{RawData, StorageTarget, TidyRow, UploadError};
use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use std::path::Path;
use tracing::{debug, info};

/// Column names of the exported file
pub const CSV_HEADER: [&str; 3] = ["date", "Location", "IPCA"];

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Render rows as a semicolon-delimited CSV blob.
/// The header is always written, so zero rows still yields a valid file.
pub fn render_csv(rows: &[TidyRow]) -> Result<RawData> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;
    let text = String::from_utf8(bytes).context("CSV output is not valid UTF-8")?;

    info!("Rendered {} rows ({} bytes)", rows.len(), text.len());

    Ok(RawData::Csv(text))
}

/// Keep a copy of the CSV on local disk
pub fn write_local_copy(payload: &RawData, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(path, payload.as_csv()?)
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote local copy to {:?}", path);
    Ok(())
}

/// PUT the CSV at the target's object URL.
/// When `replace` is off an existing object aborts the upload with
/// `UploadError::AlreadyExists`.
pub async fn upload_object(client: &Client, target: &StorageTarget, payload: &RawData) -> Result<usize> {
    let url = target.object_url();

    if !target.replace && object_exists(client, target).await? {
        return Err(UploadError::AlreadyExists { url }.into());
    }

    let body = payload.as_csv()?.as_bytes().to_vec();
    let size = body.len();
    info!("Uploading {} bytes to {}", size, url);

    let request = client
        .put(&url)
        .header(header::CONTENT_TYPE, CSV_CONTENT_TYPE)
        .body(body);

    authorize(request, target)
        .send()
        .await
        .with_context(|| format!("PUT {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status from PUT {}", url))?;

    info!("Upload complete: {}", target.key);
    Ok(size)
}

async fn object_exists(client: &Client, target: &StorageTarget) -> Result<bool> {
    let url = target.object_url();
    let response = authorize(client.head(&url), target)
        .send()
        .await
        .with_context(|| format!("HEAD {} failed", url))?;

    let status = response.status();
    debug!("HEAD {} -> {}", url, status);

    match status {
        s if s.is_success() => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        s => Err(anyhow::anyhow!("Unexpected status {} checking {}", s, url)),
    }
}

fn authorize(request: reqwest::RequestBuilder, target: &StorageTarget) -> reqwest::RequestBuilder {
    match &target.token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}
