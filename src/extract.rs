use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::browser::{BrowserSession, PageFetcher, resolve_link};
use crate::config::PageLayout;
use crate::discovery::EntityRef;
use crate::error::ScrapeError;
use crate::retry::retry;

/// Columns of a county flight table once its header rows are dropped
pub const TABLE_COLUMNS: [&str; 5] = ["date", "flight_id", "scale", "index_url", "frame_status"];

/// Leading rows of every county table (title and column headings)
pub const HEADER_ROWS: usize = 2;

/// Extraction is attempted once, then once more after a reload
pub const EXTRACTION_ATTEMPTS: u32 = 2;

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());

/// Positional cell text of one table row
pub type RawTableRow = Vec<String>;

/// Data rows of a county table, header rows already removed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub rows: Vec<RawTableRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything read from one county page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPage {
    pub table: RawTable,
    /// Shared by every row of the county; empty when the page has no image
    pub reference_image_url: String,
}

/// Load a county page into the active tab and read its table.
///
/// A failed read triggers one reload and a second read. A second failure is
/// returned as `ScrapeError::Extraction` for the caller to skip the county.
pub async fn extract_entity_page<F: PageFetcher>(
    session: &mut BrowserSession<F>,
    entity: &EntityRef,
    layout: &PageLayout,
) -> Result<EntityPage, ScrapeError> {
    session
        .load(&entity.url, Some(&layout.entity_table))
        .await?;

    let page = retry(
        session,
        EXTRACTION_ATTEMPTS,
        |s| extract_page(s.html(), &entity.url, layout),
        |s| Box::pin(s.reload()),
    )
    .await?;

    info!(
        "Extracted {} rows for {} from {}",
        page.table.len(),
        entity.name,
        entity.url
    );
    Ok(page)
}

/// Read the flight table and reference image from a county page's HTML
pub fn extract_page(html: &str, page_url: &str, layout: &PageLayout) -> Result<EntityPage, ScrapeError> {
    let document = Html::parse_document(html);

    let table = document
        .select(layout.entity_table.selector())
        .next()
        .ok_or_else(|| {
            ScrapeError::Extraction(format!("table '{}' not found", layout.entity_table))
        })?;

    let table = read_table(table)?;

    let reference_image_url = document
        .select(layout.entity_image.selector())
        .find_map(|img| img.value().attr("src"))
        .map(|src| resolve_link(page_url, src.trim()))
        .unwrap_or_else(|| {
            debug!("No reference image '{}' on {}", layout.entity_image, page_url);
            String::new()
        });

    Ok(EntityPage {
        table,
        reference_image_url,
    })
}

fn read_table(table: ElementRef<'_>) -> Result<RawTable, ScrapeError> {
    let all_rows: Vec<RawTableRow> = table.select(&ROW_SELECTOR).map(read_row).collect();

    if all_rows.len() < HEADER_ROWS {
        return Err(ScrapeError::Extraction(format!(
            "table has {} rows, expected at least {} header rows",
            all_rows.len(),
            HEADER_ROWS
        )));
    }

    let mut rows: Vec<RawTableRow> = all_rows
        .into_iter()
        .skip(HEADER_ROWS)
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(TABLE_COLUMNS.len());
    if width != TABLE_COLUMNS.len() {
        return Err(ScrapeError::Extraction(format!(
            "table has {} columns, expected {}",
            width,
            TABLE_COLUMNS.len()
        )));
    }

    // Short rows are padded the way missing trailing cells render: empty
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }

    Ok(RawTable { rows })
}

fn read_row(row: ElementRef<'_>) -> RawTableRow {
    let mut cells = Vec::new();
    for cell in row.select(&CELL_SELECTOR) {
        let text = cell.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, TABLE_COLUMNS.len());
        for _ in 0..span {
            cells.push(text.clone());
        }
    }
    cells
}
