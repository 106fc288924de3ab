use anyhow::{Result, anyhow};
use scraper::Selector;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INDEX_URL: &str =
    "https://www.library.ucsb.edu/geospatial/airphotos/california-aerial-photography-county";

/// Flight index links are this base followed by the lowercased flight id without hyphens
pub const DEFAULT_INDEX_BASE_URL: &str = "http://mil.library.ucsb.edu/ap_indexes/";

const DEFAULT_NAV_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GRACE_SECS: u64 = 2;

/// A compiled CSS selector that remembers its source text for log messages
#[derive(Clone)]
pub struct CssSelector {
    css: String,
    selector: Selector,
}

impl CssSelector {
    pub fn parse(css: &str) -> Result<Self> {
        let selector =
            Selector::parse(css).map_err(|e| anyhow!("invalid CSS selector '{}': {}", css, e))?;
        Ok(Self {
            css: css.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.css
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl fmt::Debug for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CssSelector").field(&self.css).finish()
    }
}

impl fmt::Display for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css)
    }
}

/// Structural positions on the index and county pages.
///
/// Defaults are the CSS equivalents of the locations the library pages have used:
/// the county list lives in `#content article div ul`, each county page carries its
/// flight table in the fifth top-level `div` of the body.
#[derive(Debug, Clone)]
pub struct PageLayout {
    /// Container holding the `li > a` county anchors
    pub index_list: CssSelector,
    /// Element whose presence means the index page finished rendering
    pub index_marker: CssSelector,
    /// The flight table on a county page (also used as its load marker)
    pub entity_table: CssSelector,
    /// Image whose `src` is the county's reference image
    pub entity_image: CssSelector,
}

impl PageLayout {
    pub fn new(
        index_list: &str,
        index_marker: &str,
        entity_table: &str,
        entity_image: &str,
    ) -> Result<Self> {
        Ok(Self {
            index_list: CssSelector::parse(index_list)?,
            index_marker: CssSelector::parse(index_marker)?,
            entity_table: CssSelector::parse(entity_table)?,
            entity_image: CssSelector::parse(entity_image)?,
        })
    }

    /// Load selectors from `AIRPHOTO_SELECTOR_*`, falling back to the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default_css();
        Self::new(
            &env_or("AIRPHOTO_SELECTOR_INDEX_LIST", defaults.0),
            &env_or("AIRPHOTO_SELECTOR_INDEX_MARKER", defaults.1),
            &env_or("AIRPHOTO_SELECTOR_ENTITY_TABLE", defaults.2),
            &env_or("AIRPHOTO_SELECTOR_ENTITY_IMAGE", defaults.3),
        )
    }

    fn default_css() -> (&'static str, &'static str, &'static str, &'static str) {
        (
            "#content > article > div > ul",
            "#content > article > div > h3",
            "body > div:nth-of-type(5) > table",
            "body > div:nth-of-type(4) img",
        )
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        let (list, marker, table, image) = Self::default_css();
        // The default selectors are constants and always parse
        Self::new(list, marker, table, image).expect("default page selectors are valid")
    }
}

/// Timing applied to every page load
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Upper bound on a single navigation
    pub nav_timeout: Duration,
    /// Pause after each navigation so client-side rendering can settle
    pub grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(DEFAULT_NAV_TIMEOUT_SECS),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub index_url: String,
    pub index_base_url: String,
    pub user_agent: String,
    pub session: SessionSettings,
    pub layout: PageLayout,
    pub output_path: PathBuf,
    pub merged_output_path: PathBuf,
    pub reference_path: Option<PathBuf>,
}

impl ScrapeConfig {
    /// Load configuration from environment variables (after `dotenvy` has run)
    pub fn from_env() -> Result<Self> {
        Ok(ScrapeConfig {
            index_url: env_or("AIRPHOTO_INDEX_URL", DEFAULT_INDEX_URL),
            index_base_url: env_or("AIRPHOTO_INDEX_BASE_URL", DEFAULT_INDEX_BASE_URL),
            user_agent: env_or(
                "AIRPHOTO_USER_AGENT",
                &format!("airphoto-index-scraper/{}", env!("CARGO_PKG_VERSION")),
            ),
            session: SessionSettings {
                nav_timeout: Duration::from_secs(env_secs(
                    "AIRPHOTO_NAV_TIMEOUT_SECS",
                    DEFAULT_NAV_TIMEOUT_SECS,
                )?),
                grace: Duration::from_secs(env_secs("AIRPHOTO_GRACE_SECS", DEFAULT_GRACE_SECS)?),
            },
            layout: PageLayout::from_env()?,
            output_path: env_or("AIRPHOTO_OUTPUT", "flight_records.csv").into(),
            merged_output_path: env_or("AIRPHOTO_MERGED_OUTPUT", "merged_records.csv").into(),
            reference_path: env::var("AIRPHOTO_REFERENCE")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a whole number of seconds, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
