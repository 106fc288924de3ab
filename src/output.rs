use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::aggregate::AggregatedTable;
use crate::dates::optional_date;
use crate::normalize::{FlightRecord, Scale};
use crate::reconcile::MergedDataset;

/// Flat row of the merged file: key columns once, then each side's columns
#[derive(Debug, Serialize)]
struct MergedRow<'a> {
    #[serde(with = "optional_date")]
    date: Option<NaiveDate>,
    flight_id: &'a str,
    scale: Option<&'a Scale>,
    index_url: Option<&'a str>,
    frame_status: Option<&'a str>,
    county_name: Option<&'a str>,
    county_url: Option<&'a str>,
    reference_image_url: Option<&'a str>,
    long: Option<f64>,
    lat: Option<f64>,
    frame: Option<&'a str>,
    reference_scale: Option<&'a str>,
    scan: Option<&'a str>,
}

pub fn write_flight_records_to<W: Write>(writer: W, table: &AggregatedTable) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in table.rows() {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn read_flight_records_from<R: Read>(reader: R) -> Result<Vec<FlightRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for (line, record) in csv_reader.deserialize().enumerate() {
        let record: FlightRecord =
            record.with_context(|| format!("Invalid flight record on line {}", line + 2))?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_merged_to<W: Write>(writer: W, merged: &MergedDataset) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in &merged.rows {
        let flight = row.flight.as_ref();
        let reference = row.reference.as_ref();
        csv_writer.serialize(MergedRow {
            date: row.date(),
            flight_id: row.flight_id(),
            scale: flight.map(|f| &f.scale),
            index_url: flight.map(|f| f.index_url.as_str()),
            frame_status: flight.map(|f| f.frame_status.as_str()),
            county_name: flight.map(|f| f.entity_name.as_str()),
            county_url: flight.map(|f| f.entity_url.as_str()),
            reference_image_url: flight.map(|f| f.reference_image_url.as_str()),
            long: reference.map(|r| r.long),
            lat: reference.map(|r| r.lat),
            frame: reference.map(|r| r.frame.as_str()),
            reference_scale: reference.map(|r| r.scale.as_str()),
            scan: reference.and_then(|r| r.scan.as_deref()),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the aggregated records, replacing `path` only once the file is complete
pub fn write_flight_records(path: &Path, table: &AggregatedTable) -> Result<()> {
    write_atomically(path, |file| write_flight_records_to(file, table))?;
    info!("Wrote {} flight records to {}", table.len(), path.display());
    Ok(())
}

pub fn read_flight_records(path: &Path) -> Result<Vec<FlightRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open flight records {}", path.display()))?;
    let records = read_flight_records_from(file)
        .with_context(|| format!("Failed to read flight records {}", path.display()))?;
    info!("Loaded {} flight records from {}", records.len(), path.display());
    Ok(records)
}

pub fn write_merged(path: &Path, merged: &MergedDataset) -> Result<()> {
    write_atomically(path, |file| write_merged_to(file, merged))?;
    info!("Wrote {} merged rows to {}", merged.rows.len(), path.display());
    Ok(())
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let result = File::create(temp_path)
        .with_context(|| format!("Failed to create {}", temp_path.display()))
        .and_then(|mut file| write(&mut file))
        .and_then(|_| {
            fs::rename(temp_path, path)
                .with_context(|| format!("Failed to move output into {}", path.display()))
        });

    if result.is_err() && temp_path.exists() {
        // Clean up temp file on failure
        let _ = fs::remove_file(temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::outer_join;
    use crate::reference::ReferenceRecord;

    fn record(flight_id: &str, date: Option<NaiveDate>, scale: Vec<u64>) -> FlightRecord {
        FlightRecord {
            date,
            flight_id: flight_id.to_string(),
            scale: Scale::new(scale).unwrap(),
            index_url: format!("http://mil.library.ucsb.edu/ap_indexes/{}", flight_id.to_lowercase()),
            frame_status: "Complete".to_string(),
            entity_name: "Butte".to_string(),
            entity_url: "https://library.example.edu/butte".to_string(),
            reference_image_url: "https://library.example.edu/butte.jpg".to_string(),
        }
    }

    #[test]
    fn test_flight_records_header_and_reload() {
        let table = AggregatedTable::from_records(vec![
            record("BUT-1939", NaiveDate::from_ymd_opt(1939, 5, 1), vec![20000]),
            record("C-7000", None, vec![24000, 12000]),
        ])
        .unwrap();

        let mut buf = Vec::new();
        write_flight_records_to(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,flight_id,scale,index_url,frame_status,county_name,county_url,reference_image_url"
        );
        assert!(lines.next().unwrap().starts_with("1939-05-01,BUT-1939,20000,"));
        assert!(lines.next().unwrap().starts_with(",C-7000,\"[24000, 12000]\","));

        let reloaded = read_flight_records_from(buf.as_slice()).unwrap();
        assert_eq!(reloaded, table.into_rows());
    }

    #[test]
    fn test_reload_accepts_begin_date_header() {
        let csv = "\
begin_date,flight_id,scale,index_url,frame_status,county_name,county_url,reference_image_url
5/1/1939,BUT-1939,[20000],http://idx/but1939,Complete,Butte,http://x/butte,
";
        let records = read_flight_records_from(csv.as_bytes()).unwrap();
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(1939, 5, 1));
        assert_eq!(records[0].scale.as_scalar(), Some(20000));
        assert_eq!(records[0].reference_image_url, "");
    }

    #[test]
    fn test_merged_columns() {
        let d = NaiveDate::from_ymd_opt(1939, 5, 1).unwrap();
        let table = AggregatedTable::from_records(vec![record("BUT-1939", Some(d), vec![20000])]).unwrap();
        let reference = vec![
            ReferenceRecord {
                long: -121.5,
                lat: 39.7,
                flight_id: "BUT-1939".to_string(),
                date: d,
                frame: "1-12".to_string(),
                scale: "20000".to_string(),
                scan: Some("http://x.org/1-12.jpg".to_string()),
            },
            ReferenceRecord {
                long: -122.0,
                lat: 38.0,
                flight_id: "AXL-1941".to_string(),
                date: d,
                frame: "2-1".to_string(),
                scale: "12000".to_string(),
                scan: None,
            },
        ];
        let merged = outer_join(table, reference);

        let mut buf = Vec::new();
        write_merged_to(&mut buf, &merged).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "date,flight_id,scale,index_url,frame_status,county_name,county_url,reference_image_url,long,lat,frame,reference_scale,scan"
        );
        assert!(lines[1].starts_with("1939-05-01,BUT-1939,20000,"));
        assert!(lines[1].ends_with(",-121.5,39.7,1-12,20000,http://x.org/1-12.jpg"));
        assert_eq!(lines[2], "1939-05-01,AXL-1941,,,,,,,-122.0,38.0,2-1,12000,");
    }

    #[test]
    fn test_write_flight_records_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("flight_records.csv");
        let table = AggregatedTable::from_records(vec![record("BUT-1939", None, vec![20000])]).unwrap();

        write_flight_records(&path, &table).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("out").join("flight_records.csv.tmp").exists());
        assert_eq!(read_flight_records(&path).unwrap().len(), 1);
    }
}
