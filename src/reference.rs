//! Loader for the independently sourced geospatial flight dataset.
//!
//! The file is a CSV with at least `long, lat, flight_id, date, frame, scale, scan`.
//! Index columns left behind by dataframe exports (`Unnamed: 0`, blank headers) are
//! discarded, as is any other column not listed above.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::dates::parse_flexible_date;

const REQUIRED_COLUMNS: [&str; 7] = ["long", "lat", "flight_id", "date", "frame", "scale", "scan"];

/// Whole links inside the free-text `scan` column, up to the next delimiter
static SCAN_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s"'<>,;()]+"#).unwrap());

static IMAGE_EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:jpe?g|png|gif|tiff?)$").unwrap());

/// One row of the reference dataset
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub long: f64,
    pub lat: f64,
    pub flight_id: String,
    pub date: NaiveDate,
    pub frame: String,
    /// Kept as written; the reference dataset does not share the scrape's notation
    pub scale: String,
    pub scan: Option<String>,
}

/// Reference rows plus how many input rows could not be used
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceDataset {
    pub records: Vec<ReferenceRecord>,
    pub skipped_rows: usize,
}

/// Pull the image URL out of a `scan` cell
pub fn extract_scan_url(raw: &str) -> Option<String> {
    SCAN_URL_RE
        .find_iter(raw)
        .map(|m| m.as_str())
        .find(|url| IMAGE_EXTENSION_RE.is_match(url))
        .map(str::to_string)
}

/// Header names that mark a throwaway column
fn is_discardable(header: &str) -> bool {
    let header = header.trim();
    header.is_empty() || header.starts_with("Unnamed")
}

pub fn load_reference_csv(path: &Path) -> Result<ReferenceDataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open reference dataset {}", path.display()))?;
    let dataset = read_reference(file)
        .with_context(|| format!("Failed to read reference dataset {}", path.display()))?;

    info!(
        "Loaded {} reference records from {} ({} rows skipped)",
        dataset.records.len(),
        path.display(),
        dataset.skipped_rows
    );
    Ok(dataset)
}

pub fn read_reference<R: Read>(reader: R) -> Result<ReferenceDataset> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let discarded: Vec<&str> = headers.iter().filter(|h| is_discardable(h)).collect();
    if !discarded.is_empty() {
        info!("Discarding {} index column(s)", discarded.len());
    }

    let mut positions = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| !is_discardable(h) && h.trim() == name)
            .ok_or_else(|| anyhow!("Reference dataset has no '{}' column", name))?;
    }

    let mut dataset = ReferenceDataset::default();
    for (line, row) in csv_reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV row {}", line + 2))?;
        match parse_row(&row, &positions) {
            Ok(record) => dataset.records.push(record),
            Err(e) => {
                warn!("Skipping reference row {}: {}", line + 2, e);
                dataset.skipped_rows += 1;
            }
        }
    }

    Ok(dataset)
}

fn parse_row(row: &StringRecord, positions: &[usize; REQUIRED_COLUMNS.len()]) -> Result<ReferenceRecord> {
    let field = |i: usize| row.get(positions[i]).unwrap_or("").trim();

    let long = field(0)
        .parse::<f64>()
        .with_context(|| format!("invalid longitude '{}'", field(0)))?;
    let lat = field(1)
        .parse::<f64>()
        .with_context(|| format!("invalid latitude '{}'", field(1)))?;
    let date = parse_flexible_date(field(3)).ok_or_else(|| anyhow!("invalid date '{}'", field(3)))?;

    Ok(ReferenceRecord {
        long,
        lat,
        flight_id: field(2).to_string(),
        date,
        frame: field(4).to_string(),
        scale: field(5).to_string(),
        scan: extract_scan_url(field(6)),
    })
}
