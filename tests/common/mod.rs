//! Shared fixtures for the scrape pipeline integration tests.
//!
//! `FixtureFetcher` stands in for the network: it serves the saved library pages
//! under `tests/fixtures/airphotos/` and records every URL it was asked for.

#![allow(dead_code)]

use airphoto_index::{PageFetcher, PageLayout, ScrapeConfig, SessionSettings};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub const SITE: &str = "http://fixtures.test";
pub const INDEX_URL: &str = "http://fixtures.test/airphotos/county";
pub const INDEX_BASE_URL: &str = "http://mil.library.ucsb.edu/ap_indexes/";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from("tests/fixtures/airphotos").join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}

pub fn county_url(slug: &str) -> String {
    format!("{}/airphotos/{}", SITE, slug)
}

/// In-memory site. A URL can hold several responses, served in order, with the
/// last one repeated.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    /// The saved library site: the index page and every county page on disk
    pub fn library() -> Self {
        Self::default()
            .with_page(INDEX_URL, &fixture("index.html"))
            .with_page(&county_url("alameda"), &fixture("alameda.html"))
            .with_page(&county_url("butte"), &fixture("butte.html"))
            .with_page(&county_url("del-norte"), &fixture("del-norte.html"))
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_responses(url, vec![html.to_string()])
    }

    pub fn with_responses(self, url: &str, responses: Vec<String>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut pages = self.pages.lock().unwrap();
        let responses = pages
            .get_mut(url)
            .ok_or_else(|| anyhow!("404 Not Found for {}", url))?;
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| anyhow!("no response configured for {}", url))
        }
    }
}

/// Shared handle so a test can inspect the fetcher after the run consumed it
#[derive(Clone)]
pub struct SharedFetcher(pub std::sync::Arc<FixtureFetcher>);

#[async_trait]
impl PageFetcher for SharedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.0.fetch(url).await
    }
}

/// Configuration pointing at the fixture site with outputs under `dir`
pub fn test_config(dir: &Path) -> ScrapeConfig {
    ScrapeConfig {
        index_url: INDEX_URL.to_string(),
        index_base_url: INDEX_BASE_URL.to_string(),
        user_agent: "airphoto-index-tests".to_string(),
        session: SessionSettings {
            nav_timeout: Duration::from_secs(5),
            grace: Duration::ZERO,
        },
        layout: PageLayout::default(),
        output_path: dir.join("flight_records.csv"),
        merged_output_path: dir.join("merged_records.csv"),
        reference_path: None,
    }
}
