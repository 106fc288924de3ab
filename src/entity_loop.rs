use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::browser::{BrowserSession, PageFetcher};
use crate::config::PageLayout;
use crate::discovery::EntityRef;
use crate::error::{ScrapeError, truncate_message};
use crate::extract::extract_entity_page;
use crate::normalize::{FlightRecord, normalize_page};

/// Characters of an entity error kept in the failure log line
const LOGGED_ERROR_CHARS: usize = 100;

/// How one county's processing ended
#[derive(Debug)]
pub enum EntityOutcome {
    Success {
        records: Vec<FlightRecord>,
        scale_failures: usize,
    },
    /// The table was read but no row survived normalization
    SoftFailure {
        reason: String,
        scale_failures: usize,
    },
    /// Navigation or extraction failed; nothing from this county is kept
    HardFailure { error: ScrapeError },
}

/// Records of one successfully processed county
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTable {
    pub entity: EntityRef,
    pub records: Vec<FlightRecord>,
}

/// Result of walking every discovered county
#[derive(Debug, Default)]
pub struct LoopReport {
    /// Successful counties in discovery order
    pub tables: Vec<EntityTable>,
    pub attempted: usize,
    pub succeeded: usize,
    pub soft_failed: Vec<(EntityRef, String)>,
    pub hard_failed: Vec<(EntityRef, String)>,
    /// Rows dropped across all counties for an unreadable scale
    pub dropped_rows: usize,
}

impl LoopReport {
    pub fn skipped(&self) -> usize {
        self.soft_failed.len() + self.hard_failed.len()
    }
}

/// Extract and normalize one county inside its own tab.
///
/// The tab is closed before this returns, whatever the outcome.
pub async fn process_entity<F: PageFetcher>(
    session: &mut BrowserSession<F>,
    entity: &EntityRef,
    layout: &PageLayout,
    index_base_url: &str,
) -> EntityOutcome {
    let mut tab = session.open_tab();

    let page = match extract_entity_page(&mut *tab, entity, layout).await {
        Ok(page) => page,
        Err(error) => return EntityOutcome::HardFailure { error },
    };

    let normalized = normalize_page(page, entity, index_base_url);
    if normalized.records.is_empty() {
        return EntityOutcome::SoftFailure {
            reason: format!(
                "no usable rows ({} dropped for unreadable scale)",
                normalized.scale_failures
            ),
            scale_failures: normalized.scale_failures,
        };
    }

    EntityOutcome::Success {
        records: normalized.records,
        scale_failures: normalized.scale_failures,
    }
}

/// Process every county in discovery order, one at a time.
///
/// A failing county is logged and skipped; it never stops the loop.
pub async fn run_entities<F: PageFetcher>(
    session: &mut BrowserSession<F>,
    entities: &[EntityRef],
    layout: &PageLayout,
    index_base_url: &str,
) -> LoopReport {
    let mut report = LoopReport {
        attempted: entities.len(),
        ..Default::default()
    };

    for (index, entity) in entities.iter().enumerate() {
        let start = Instant::now();
        let span = info_span!("entity", name = %entity.name);

        let outcome = process_entity(session, entity, layout, index_base_url)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match outcome {
            EntityOutcome::Success {
                records,
                scale_failures,
            } => {
                info!(
                    "{}/{}: {} records ({} rows dropped) in {:.1}s",
                    index + 1,
                    entities.len(),
                    records.len(),
                    scale_failures,
                    start.elapsed().as_secs_f64()
                );
                report.succeeded += 1;
                report.dropped_rows += scale_failures;
                report.tables.push(EntityTable {
                    entity: entity.clone(),
                    records,
                });
            }
            EntityOutcome::SoftFailure {
                reason,
                scale_failures,
            } => {
                warn!(
                    "Skipping {} ({}): {}",
                    entity.name,
                    entity.url,
                    truncate_message(&reason, LOGGED_ERROR_CHARS)
                );
                report.dropped_rows += scale_failures;
                report.soft_failed.push((entity.clone(), reason));
            }
            EntityOutcome::HardFailure { error } => {
                let message = error.to_string();
                warn!(
                    "Skipping {} ({}): {}",
                    entity.name,
                    entity.url,
                    truncate_message(&message, LOGGED_ERROR_CHARS)
                );
                report.hard_failed.push((entity.clone(), message));
            }
        }
    }

    info!(
        "Processed {} entities: {} succeeded, {} skipped",
        report.attempted,
        report.succeeded,
        report.skipped()
    );
    report
}
