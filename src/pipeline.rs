use anyhow::Result;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::aggregate::AggregatedTable;
use crate::browser::{BrowserSession, PageFetcher};
use crate::config::ScrapeConfig;
use crate::discovery::discover_entities;
use crate::entity_loop::run_entities;
use crate::error::ScrapeError;
use crate::output::{read_flight_records, write_flight_records, write_merged};
use crate::reconcile::{MergeStats, outer_join};
use crate::reference::load_reference_csv;

/// What a run did, for the final log line and the CLI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub entities_discovered: usize,
    pub entities_succeeded: usize,
    pub entities_soft_failed: usize,
    pub entities_hard_failed: usize,
    pub dropped_rows: usize,
    pub aggregated_rows: usize,
    pub reference_rows: Option<usize>,
    pub reference_rows_skipped: usize,
    pub merged_rows: Option<usize>,
    pub merge: Option<MergeStats>,
}

impl RunSummary {
    pub fn entities_skipped(&self) -> usize {
        self.entities_soft_failed + self.entities_hard_failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entities_discovered > 0 {
            writeln!(
                f,
                "Entities: {} discovered, {} succeeded, {} skipped ({} empty, {} failed)",
                self.entities_discovered,
                self.entities_succeeded,
                self.entities_skipped(),
                self.entities_soft_failed,
                self.entities_hard_failed
            )?;
            writeln!(f, "Rows dropped for unreadable scale: {}", self.dropped_rows)?;
        }
        writeln!(f, "Flight records: {}", self.aggregated_rows)?;
        match (&self.merged_rows, &self.merge) {
            (Some(rows), Some(stats)) => {
                writeln!(
                    f,
                    "Reference rows: {} ({} skipped)",
                    self.reference_rows.unwrap_or_default(),
                    self.reference_rows_skipped
                )?;
                write!(
                    f,
                    "Merged rows: {} ({} matched, {} scraped only, {} reference only)",
                    rows, stats.matched, stats.scraped_only, stats.reference_only
                )
            }
            _ => write!(f, "Merged rows: not reconciled (no reference dataset)"),
        }
    }
}

/// Process exit code for a failed run.
///
/// `2` when the run was aborted by a fatal scrape error (no counties found, or
/// none produced records), `1` for anything else (IO, configuration, reference file).
pub fn failure_exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ScrapeError>() {
        Some(scrape_error) if scrape_error.is_fatal() => 2,
        _ => 1,
    }
}

/// Scrape every county, write the flight records and reconcile them when a
/// reference dataset is configured.
///
/// The browser session is torn down before returning, on success or failure.
pub async fn run_scrape<F: PageFetcher>(config: &ScrapeConfig, fetcher: F) -> Result<RunSummary> {
    let mut session = BrowserSession::new(fetcher, config.session);
    let result = scrape_with_session(&mut session, config).await;
    session.quit();
    result
}

async fn scrape_with_session<F: PageFetcher>(
    session: &mut BrowserSession<F>,
    config: &ScrapeConfig,
) -> Result<RunSummary> {
    info!("Loading county index {}", config.index_url);
    session
        .load(&config.index_url, Some(&config.layout.index_marker))
        .await
        .map_err(|e| ScrapeError::Discovery(format!("index page unavailable: {}", e)))?;

    let entities = discover_entities(session.html(), &config.index_url, &config.layout.index_list)?;

    let report = run_entities(session, &entities, &config.layout, &config.index_base_url).await;

    let mut summary = RunSummary {
        entities_discovered: entities.len(),
        entities_succeeded: report.succeeded,
        entities_soft_failed: report.soft_failed.len(),
        entities_hard_failed: report.hard_failed.len(),
        dropped_rows: report.dropped_rows,
        ..Default::default()
    };

    let aggregated = AggregatedTable::from_entity_tables(report.tables, report.attempted)?;
    summary.aggregated_rows = aggregated.len();
    write_flight_records(&config.output_path, &aggregated)?;

    match &config.reference_path {
        Some(reference_path) => {
            reconcile_into(&mut summary, aggregated, reference_path, &config.merged_output_path)?
        }
        None => warn!("No reference dataset configured (AIRPHOTO_REFERENCE); skipping reconciliation"),
    }

    info!("Run complete\n{}", summary);
    Ok(summary)
}

/// Reconcile a previously written flight record file against a reference dataset
pub fn run_reconcile(records_path: &Path, reference_path: &Path, merged_path: &Path) -> Result<RunSummary> {
    let records = read_flight_records(records_path)?;
    let aggregated = AggregatedTable::from_records(records)?;

    let mut summary = RunSummary {
        aggregated_rows: aggregated.len(),
        ..Default::default()
    };
    reconcile_into(&mut summary, aggregated, reference_path, merged_path)?;

    info!("Reconciliation complete\n{}", summary);
    Ok(summary)
}

fn reconcile_into(
    summary: &mut RunSummary,
    aggregated: AggregatedTable,
    reference_path: &Path,
    merged_path: &Path,
) -> Result<()> {
    let reference = load_reference_csv(reference_path)?;
    summary.reference_rows = Some(reference.records.len());
    summary.reference_rows_skipped = reference.skipped_rows;

    let merged = outer_join(aggregated, reference.records);
    write_merged(merged_path, &merged)?;

    summary.merged_rows = Some(merged.rows.len());
    summary.merge = Some(merged.stats);
    Ok(())
}
