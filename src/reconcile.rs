use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::aggregate::AggregatedTable;
use crate::normalize::FlightRecord;
use crate::reference::ReferenceRecord;

/// Join key shared by both datasets
pub type MergeKey = (NaiveDate, String);

/// One row of the reconciled dataset; at least one side is present
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub flight: Option<FlightRecord>,
    pub reference: Option<ReferenceRecord>,
}

impl MergedRecord {
    /// Date of whichever side is present (scraped side first)
    pub fn date(&self) -> Option<NaiveDate> {
        self.flight
            .as_ref()
            .and_then(|f| f.date)
            .or_else(|| self.reference.as_ref().map(|r| r.date))
    }

    pub fn flight_id(&self) -> &str {
        self.flight
            .as_ref()
            .map(|f| f.flight_id.as_str())
            .or_else(|| self.reference.as_ref().map(|r| r.flight_id.as_str()))
            .unwrap_or_default()
    }

    pub fn is_matched(&self) -> bool {
        self.flight.is_some() && self.reference.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub matched: usize,
    pub scraped_only: usize,
    pub reference_only: usize,
    /// Keys listed more than once on the scraped side
    pub duplicate_scraped_keys: usize,
    /// Keys listed more than once on the reference side
    pub duplicate_reference_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDataset {
    pub rows: Vec<MergedRecord>,
    pub stats: MergeStats,
}

fn flight_key(record: &FlightRecord) -> Option<MergeKey> {
    record.date.map(|d| (d, record.flight_id.trim().to_string()))
}

fn reference_key(record: &ReferenceRecord) -> MergeKey {
    (record.date, record.flight_id.trim().to_string())
}

fn count_duplicate_keys<I: Iterator<Item = MergeKey>>(keys: I) -> usize {
    let mut counts: HashMap<MergeKey, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts.values().filter(|&&n| n > 1).count()
}

/// Full outer join of scraped records and reference rows on `(date, flight_id)`.
///
/// Dates are compared as calendar dates. A record without a date matches nothing.
/// Keys repeated on both sides produce every pairing. Output order is the scraped
/// rows in aggregate order, each followed by its matches, then the unmatched
/// reference rows in input order.
pub fn outer_join(aggregated: AggregatedTable, reference: Vec<ReferenceRecord>) -> MergedDataset {
    let flights = aggregated.into_rows();

    let mut stats = MergeStats {
        duplicate_scraped_keys: count_duplicate_keys(flights.iter().filter_map(flight_key)),
        duplicate_reference_keys: count_duplicate_keys(reference.iter().map(reference_key)),
        ..Default::default()
    };
    if stats.duplicate_scraped_keys > 0 || stats.duplicate_reference_keys > 0 {
        warn!(
            "Join keys repeat ({} scraped, {} reference); matching rows pair up in every combination",
            stats.duplicate_scraped_keys, stats.duplicate_reference_keys
        );
    }

    let mut by_key: HashMap<MergeKey, Vec<usize>> = HashMap::new();
    for (idx, record) in reference.iter().enumerate() {
        by_key.entry(reference_key(record)).or_default().push(idx);
    }

    let mut matched_reference = vec![false; reference.len()];
    let mut rows = Vec::with_capacity(flights.len() + reference.len());

    for flight in flights {
        let matches = flight_key(&flight).and_then(|key| by_key.get(&key));
        match matches {
            Some(indices) => {
                for &idx in indices {
                    matched_reference[idx] = true;
                    rows.push(MergedRecord {
                        flight: Some(flight.clone()),
                        reference: Some(reference[idx].clone()),
                    });
                    stats.matched += 1;
                }
            }
            None => {
                rows.push(MergedRecord {
                    flight: Some(flight),
                    reference: None,
                });
                stats.scraped_only += 1;
            }
        }
    }

    for (record, matched) in reference.into_iter().zip(matched_reference) {
        if !matched {
            rows.push(MergedRecord {
                flight: None,
                reference: Some(record),
            });
            stats.reference_only += 1;
        }
    }

    info!(
        "Merged dataset has {} rows ({} matched, {} scraped only, {} reference only)",
        rows.len(),
        stats.matched,
        stats.scraped_only,
        stats.reference_only
    );

    MergedDataset { rows, stats }
}
