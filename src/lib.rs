//! Aerial photography flight index scraper.
//!
//! Walks the per-county flight tables of a library's aerial photography index,
//! normalizes them into one table of flight records and reconciles that table
//! against an independently sourced geospatial dataset.

pub mod aggregate;
pub mod browser;
pub mod config;
pub mod dates;
pub mod discovery;
pub mod entity_loop;
pub mod error;
pub mod extract;
pub mod log_format;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod reference;
pub mod retry;

pub use aggregate::AggregatedTable;
pub use browser::{BrowserSession, HttpFetcher, PageFetcher};
pub use config::{PageLayout, ScrapeConfig, SessionSettings};
pub use discovery::EntityRef;
pub use error::ScrapeError;
pub use normalize::{FlightRecord, Scale};
pub use pipeline::{RunSummary, failure_exit_code, run_reconcile, run_scrape};
pub use reconcile::{MergedDataset, MergedRecord};
pub use reference::ReferenceRecord;
