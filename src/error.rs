use std::time::Duration;
use thiserror::Error;

/// Failures raised while discovering, extracting and aggregating flight records.
///
/// Only `Discovery` and `EmptyAggregate` abort a run. The remaining variants are
/// scoped to a single entity (or a single row for `ScaleParse`) and are absorbed
/// by the entity loop.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Index page structure not recognized, or it listed no entities
    #[error("index page structure not recognized: {0}")]
    Discovery(String),

    /// Page did not present its marker in time. Logged, never returned from a load.
    #[error("page {url} did not present '{marker}' within {timeout:?}")]
    NavigationTimeout {
        url: String,
        marker: String,
        timeout: Duration,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Table missing or malformed after the reload-and-retry
    #[error("table extraction failed: {0}")]
    Extraction(String),

    #[error("scale '{raw}' does not contain a numeric ratio")]
    ScaleParse { raw: String },

    #[error("none of the {attempted} entities produced any records")]
    EmptyAggregate { attempted: usize },
}

impl ScrapeError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::Discovery(_) | ScrapeError::EmptyAggregate { .. }
        )
    }
}

/// Shortens an error message to at most `max_chars` characters for log lines.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}
