//! Page session used by the scrape.
//!
//! The session mirrors a tabbed browser: every county is read inside its own tab,
//! and the tab is closed when its [`TabGuard`] goes out of scope, whichever way the
//! county's processing ended. Page bytes come from a [`PageFetcher`], so tests can
//! serve fixtures and production uses [`HttpFetcher`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::Html;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

use crate::config::{CssSelector, SessionSettings};
use crate::error::ScrapeError;

/// Source of raw page HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the document at `url`
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches pages over HTTP(S)
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed for URL {}", url))?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}

#[derive(Debug, Default)]
struct Tab {
    url: Option<String>,
    marker: Option<CssSelector>,
    html: String,
}

/// One logical browsing session shared by every step of a run
pub struct BrowserSession<F: PageFetcher> {
    fetcher: F,
    settings: SessionSettings,
    tabs: Vec<Tab>,
}

impl<F: PageFetcher> BrowserSession<F> {
    /// Start a session with a single blank tab
    pub fn new(fetcher: F, settings: SessionSettings) -> Self {
        Self {
            fetcher,
            settings,
            tabs: vec![Tab::default()],
        }
    }

    /// Open a blank tab and make it active. The tab closes when the guard drops.
    pub fn open_tab(&mut self) -> TabGuard<'_, F> {
        self.tabs.push(Tab::default());
        debug!("Opened tab {}", self.tabs.len());
        TabGuard { session: self }
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Navigate the active tab to `url`.
    ///
    /// A navigation that outlasts the timeout, or a page without `marker`, is logged
    /// as a navigation timeout and the tab keeps whatever it received; extraction
    /// against it may then fail. Only a failed request is returned as an error.
    pub async fn load(&mut self, url: &str, marker: Option<&CssSelector>) -> Result<(), ScrapeError> {
        let settings = self.settings;
        debug!("Loading {}", url);

        let fetched = tokio::time::timeout(settings.nav_timeout, self.fetcher.fetch(url)).await;

        let html = match fetched {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    reason: format!("{:#}", e),
                });
            }
            Err(_) => {
                let timeout = ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    marker: marker.map(|m| m.to_string()).unwrap_or_default(),
                    timeout: settings.nav_timeout,
                };
                warn!("{}; continuing with an empty page", timeout);
                String::new()
            }
        };

        if let Some(marker) = marker
            && !html.is_empty()
            && !has_element(&html, marker)
        {
            let timeout = ScrapeError::NavigationTimeout {
                url: url.to_string(),
                marker: marker.to_string(),
                timeout: settings.nav_timeout,
            };
            warn!("{}", timeout);
        }

        let tab = self.active_tab_mut();
        tab.url = Some(url.to_string());
        tab.marker = marker.cloned();
        tab.html = html;

        if !settings.grace.is_zero() {
            tokio::time::sleep(settings.grace).await;
        }

        Ok(())
    }

    /// Re-run the last navigation of the active tab
    pub async fn reload(&mut self) -> Result<(), ScrapeError> {
        let tab = self.active_tab();
        let Some(url) = tab.url.clone() else {
            return Err(ScrapeError::Navigation {
                url: String::new(),
                reason: "cannot reload a tab that never navigated".to_string(),
            });
        };
        let marker = tab.marker.clone();

        info!("Reloading {}", url);
        self.load(&url, marker.as_ref()).await
    }

    /// HTML of the active tab (empty before the first navigation)
    pub fn html(&self) -> &str {
        &self.active_tab().html
    }

    pub fn current_url(&self) -> Option<&str> {
        self.active_tab().url.as_deref()
    }

    /// Tear the session down, closing every tab still open
    pub fn quit(self) {
        info!("Closing browser session ({} tab(s) open)", self.tabs.len());
    }

    fn active_tab(&self) -> &Tab {
        // The session always owns at least its first tab
        &self.tabs[self.tabs.len() - 1]
    }

    fn active_tab_mut(&mut self) -> &mut Tab {
        let last = self.tabs.len() - 1;
        &mut self.tabs[last]
    }

    fn close_active_tab(&mut self) {
        if self.tabs.len() > 1 {
            self.tabs.pop();
            debug!("Closed tab, {} remaining", self.tabs.len());
        }
    }
}

/// Scoped handle on a tab opened with [`BrowserSession::open_tab`]
pub struct TabGuard<'a, F: PageFetcher> {
    session: &'a mut BrowserSession<F>,
}

impl<F: PageFetcher> Deref for TabGuard<'_, F> {
    type Target = BrowserSession<F>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<F: PageFetcher> DerefMut for TabGuard<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<F: PageFetcher> Drop for TabGuard<'_, F> {
    fn drop(&mut self) {
        self.session.close_active_tab();
    }
}

fn has_element(html: &str, selector: &CssSelector) -> bool {
    Html::parse_document(html)
        .select(selector.selector())
        .next()
        .is_some()
}

/// Resolve a possibly relative link against the page it was found on
pub fn resolve_link(page_url: &str, link: &str) -> String {
    match reqwest::Url::parse(page_url).and_then(|base| base.join(link)) {
        Ok(url) => url.to_string(),
        Err(_) => link.to_string(),
    }
}
