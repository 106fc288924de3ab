use tracing::info;

use crate::entity_loop::EntityTable;
use crate::error::ScrapeError;
use crate::normalize::FlightRecord;

/// Every county's records in one table, in discovery order.
///
/// Row positions are dense: row `i` is the `i`-th record of the concatenation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedTable {
    rows: Vec<FlightRecord>,
}

impl AggregatedTable {
    /// Concatenate the per-county tables.
    ///
    /// `attempted` is the number of counties the loop tried; it only feeds the
    /// error when nothing at all was collected.
    pub fn from_entity_tables(tables: Vec<EntityTable>, attempted: usize) -> Result<Self, ScrapeError> {
        let entity_count = tables.len();
        let rows: Vec<FlightRecord> = tables.into_iter().flat_map(|t| t.records).collect();

        if rows.is_empty() {
            return Err(ScrapeError::EmptyAggregate { attempted });
        }

        info!(
            "Aggregated {} records from {} entities",
            rows.len(),
            entity_count
        );
        Ok(Self { rows })
    }

    /// Wrap records loaded from a previous run's output file
    pub fn from_records(rows: Vec<FlightRecord>) -> Result<Self, ScrapeError> {
        if rows.is_empty() {
            return Err(ScrapeError::EmptyAggregate { attempted: 0 });
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FlightRecord] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&FlightRecord> {
        self.rows.get(index)
    }

    pub fn into_rows(self) -> Vec<FlightRecord> {
        self.rows
    }
}
