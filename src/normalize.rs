use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::dates::{optional_date, parse_flexible_date};
use crate::discovery::EntityRef;
use crate::error::ScrapeError;
use crate::extract::{EntityPage, RawTableRow};

/// Map scale denominators, e.g. `1:24,000, 1:12,000` is `[24000, 12000]`.
///
/// Never empty. Written as a bare integer when there is a single ratio and as a
/// bracketed list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scale(Vec<u64>);

impl Scale {
    pub fn new(denominators: Vec<u64>) -> Option<Self> {
        if denominators.is_empty() {
            None
        } else {
            Some(Self(denominators))
        }
    }

    pub fn denominators(&self) -> &[u64] {
        &self.0
    }

    /// The single denominator, if this is not a multi-scale flight
    pub fn as_scalar(&self) -> Option<u64> {
        match self.0.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Parse the scale column as printed on county pages
    pub fn parse_ratio(raw: &str) -> Result<Self, ScrapeError> {
        let fragments: Vec<String> = raw
            .split("1:")
            .map(|f| f.replace(',', "").trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let denominators = fragments
            .iter()
            .map(|f| {
                if f.chars().all(|c| c.is_ascii_digit()) {
                    f.parse::<u64>().ok()
                } else {
                    None
                }
            })
            .collect::<Option<Vec<u64>>>();

        denominators
            .and_then(Scale::new)
            .ok_or_else(|| ScrapeError::ScaleParse {
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(only) = self.as_scalar() {
            return write!(f, "{}", only);
        }
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScaleLiteral {
    One(u64),
    Many(Vec<u64>),
}

impl FromStr for Scale {
    type Err = String;

    /// Structural parse of the written form (`24000` or `[24000, 12000]`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let literal: ScaleLiteral = serde_json::from_str(s.trim())
            .map_err(|e| format!("invalid scale literal '{}': {}", s, e))?;
        let denominators = match literal {
            ScaleLiteral::One(d) => vec![d],
            ScaleLiteral::Many(ds) => ds,
        };
        Scale::new(denominators).ok_or_else(|| format!("empty scale literal '{}'", s))
    }
}

impl Serialize for Scale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One normalized row of a county flight table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    #[serde(with = "optional_date", alias = "begin_date")]
    pub date: Option<NaiveDate>,
    pub flight_id: String,
    pub scale: Scale,
    pub index_url: String,
    pub frame_status: String,
    #[serde(rename = "county_name")]
    pub entity_name: String,
    #[serde(rename = "county_url")]
    pub entity_url: String,
    pub reference_image_url: String,
}

/// Rows kept for one county and how many were dropped for an unreadable scale
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub records: Vec<FlightRecord>,
    pub scale_failures: usize,
}

/// Build the index link for a flight: base URL plus the lowercased id with
/// everything but letters and digits removed (`C-10300` -> `c10300`)
pub fn derive_index_url(index_base_url: &str, flight_id: &str) -> String {
    let slug: String = flight_id
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    format!("{}{}", index_base_url, slug)
}

/// Type the raw cells of a county page.
///
/// The scraped index link is ignored and rebuilt from the flight id. Rows whose
/// scale cannot be read are dropped and counted; an unreadable date is kept as null.
pub fn normalize_page(page: EntityPage, entity: &EntityRef, index_base_url: &str) -> NormalizedTable {
    let mut normalized = NormalizedTable::default();

    for row in page.table.rows {
        match normalize_row(row, entity, &page.reference_image_url, index_base_url) {
            Ok(record) => normalized.records.push(record),
            Err(e) => {
                warn!("{}: dropping row: {}", entity.name, e);
                normalized.scale_failures += 1;
            }
        }
    }

    normalized
}

fn normalize_row(
    row: RawTableRow,
    entity: &EntityRef,
    reference_image_url: &str,
    index_base_url: &str,
) -> Result<FlightRecord, ScrapeError> {
    let mut cells = row.into_iter();
    let mut next = || cells.next().unwrap_or_default();

    let raw_date = next();
    let flight_id = next().trim().to_string();
    let raw_scale = next();
    let _scraped_index_url = next();
    let frame_status = next().trim().to_string();

    let scale = Scale::parse_ratio(&raw_scale)?;

    Ok(FlightRecord {
        date: parse_flexible_date(&raw_date),
        index_url: derive_index_url(index_base_url, &flight_id),
        flight_id,
        scale,
        frame_status,
        entity_name: entity.name.clone(),
        entity_url: entity.url.clone(),
        reference_image_url: reference_image_url.to_string(),
    })
}
