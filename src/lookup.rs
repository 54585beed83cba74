use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SheetConfig;

/// Response shape of the Sheets values API
/// (`GET /v4/spreadsheets/{id}/values/{range}`).
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Immutable media-id → URL mapping, loaded once at startup.
///
/// Concurrent reads from request handlers are safe because the map is
/// never mutated after load.
pub struct LookupTable {
    urls: HashMap<String, String>,
    default_url: String,
}

impl LookupTable {
    /// Fetch all rows from the configured spreadsheet and build the table.
    /// Any failure here is fatal; the caller aborts startup.
    pub async fn load(config: &SheetConfig, default_url: String) -> Result<Self> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            config.spreadsheet_id, config.range
        );

        debug!("Fetching lookup sheet: {}", url);

        let client = reqwest::Client::new();
        let response = client
            .get(&url)
            .query(&[("key", config.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach the Sheets API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API error ({}): {}", status, error_body);
        }

        let range: ValueRange = response
            .json()
            .await
            .context("Failed to parse Sheets API response")?;

        let urls = parse_rows(&range.values, &config.media_column, &config.url_column)?;
        info!("Lookup table loaded: {} entries", urls.len());

        Ok(Self { urls, default_url })
    }

    /// Build a table directly from rows; used by tests and kept separate
    /// from the network fetch.
    pub fn from_rows(
        rows: &[Vec<String>],
        config: &SheetConfig,
        default_url: String,
    ) -> Result<Self> {
        let urls = parse_rows(rows, &config.media_column, &config.url_column)?;
        Ok(Self { urls, default_url })
    }

    /// Resolve a media id to its URL, falling back to the default URL
    /// for unknown ids.
    pub fn url_for(&self, media_id: &str) -> &str {
        self.urls
            .get(media_id)
            .map(String::as_str)
            .unwrap_or(&self.default_url)
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Turn raw sheet rows into the mapping. The first row is a header naming
/// the columns; duplicate media ids keep the last row's URL.
fn parse_rows(
    rows: &[Vec<String>],
    media_column: &str,
    url_column: &str,
) -> Result<HashMap<String, String>> {
    let (header, data) = rows
        .split_first()
        .context("Sheet is empty: expected a header row")?;

    let media_idx = column_index(header, media_column)
        .with_context(|| format!("Sheet header has no '{}' column", media_column))?;
    let url_idx = column_index(header, url_column)
        .with_context(|| format!("Sheet header has no '{}' column", url_column))?;

    let mut urls = HashMap::new();
    for (i, row) in data.iter().enumerate() {
        let media_id = row.get(media_idx).map(String::as_str).unwrap_or("").trim();
        let url = row.get(url_idx).map(String::as_str).unwrap_or("").trim();
        if media_id.is_empty() || url.is_empty() {
            // Row numbering is 1-based and includes the header.
            warn!("Skipping incomplete sheet row {}", i + 2);
            continue;
        }
        urls.insert(media_id.to_string(), url.to_string());
    }

    Ok(urls)
}

fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim() == name)
}
