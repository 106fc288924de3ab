use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::browser::resolve_link;
use crate::config::CssSelector;
use crate::error::ScrapeError;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("li a[href]").unwrap());

/// A county listed on the index page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub url: String,
}

/// Collect the counties linked from the index page, in page order.
///
/// Names are unique: when a name is listed twice the later link wins but the
/// county keeps its first position. Relative links are resolved against `page_url`.
pub fn discover_entities(
    html: &str,
    page_url: &str,
    list_container: &CssSelector,
) -> Result<Vec<EntityRef>, ScrapeError> {
    let document = Html::parse_document(html);

    let container = document
        .select(list_container.selector())
        .next()
        .ok_or_else(|| {
            ScrapeError::Discovery(format!("list container '{}' not found", list_container))
        })?;

    let mut entities: Vec<EntityRef> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for anchor in container.select(&ANCHOR_SELECTOR) {
        let name = anchor.text().collect::<String>().trim().to_string();
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if name.is_empty() {
            debug!("Skipping unnamed anchor to {}", href);
            continue;
        }

        let url = resolve_link(page_url, href.trim());
        match positions.get(&name) {
            Some(&idx) => entities[idx].url = url,
            None => {
                positions.insert(name.clone(), entities.len());
                entities.push(EntityRef { name, url });
            }
        }
    }

    if entities.is_empty() {
        return Err(ScrapeError::Discovery(format!(
            "list container '{}' holds no entity links",
            list_container
        )));
    }

    info!("Discovered {} entities on {}", entities.len(), page_url);
    Ok(entities)
}
